use kernel_info::memory;
use std::{env, path::PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let ld = manifest_dir.join("kernel.ld");

    let kernel_base = memory::KERNEL_BASE;
    assert_eq!(
        kernel_base & 0xfff,
        0,
        "KERNEL_BASE must be 4 KiB aligned (got {kernel_base:#x})"
    );

    println!("cargo:rerun-if-changed={}", ld.display());

    // Host builds (tests) link normally; only the bare-metal image uses the script.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_BASE={kernel_base:#x}");
}
