//! # Kernel Entry Point
//!
//! `_start` sets up the supervisor and system stacks, clears `.bss` and
//! calls [`notmain`], which brings up the console, the exception vectors and
//! virtual memory before dropping into the idle loop.
//!
//! Only the bare-metal build has an entry point; on a hosted target this
//! binary just reports that it cannot run there.

#![cfg_attr(target_os = "none", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("the kernel image only runs on the Raspberry Pi (target_os = \"none\")");
    std::process::exit(1);
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod entry {
    use core::hint::{black_box, spin_loop};
    use kernel::{boot, trap, uart};
    use kernel_alloc::bump::BumpAllocator;
    use kernel_alloc::phys_mapper::IdentityPhysMapper;
    use kernel_console::{ConsoleLogger, console_trace};
    use kernel_info::memory;
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_vmm::{Cp15, VmConfig, VmManager};
    use log::{LevelFilter, info};

    static LOGGER: ConsoleLogger = ConsoleLogger::new(LevelFilter::Debug);

    /// Frames the stack-growth self test recurses through.
    const STACK_PROBE_FRAMES: u32 = 48;

    core::arch::global_asm!(
        ".section .text.boot, \"ax\"",
        ".globl _start",
        "_start:",
        // SVC mode, IRQ and FIQ masked
        "    mov r0, #0xD3",
        "    msr cpsr_c, r0",
        "    ldr sp, ={swi_stack}",
        // SYS mode, IRQ and FIQ masked; the kernel runs here
        "    mov r0, #0xDF",
        "    msr cpsr_c, r0",
        "    ldr sp, ={sys_stack}",
        "    ldr r0, =__bss_start__",
        "    ldr r1, =__bss_end__",
        "    mov r2, #0",
        "1:  cmp r0, r1",
        "    strlo r2, [r0], #4",
        "    blo 1b",
        "    bl notmain",
        "2:  b 2b",
        ".ltorg",
        swi_stack = const memory::SWI_STACK_TOP,
        sys_stack = const memory::SYSTEM_STACK_TOP,
    );

    unsafe extern "C" {
        static __heap_start__: u8;
    }

    fn console_putc(byte: u8) {
        uart::MiniUart::new(unsafe { uart::Mmio::new() }).write_byte(byte);
    }

    #[unsafe(no_mangle)]
    extern "C" fn notmain() -> ! {
        uart::MiniUart::new(unsafe { uart::Mmio::new() }).init();
        kernel_console::set_sink(console_putc);
        if LOGGER.init().is_err() {
            console_trace!("logger was already installed\n");
        }
        trap::install_vectors();

        #[allow(clippy::cast_possible_truncation)]
        let image_end = PhysicalAddress::new((&raw const __heap_start__).addr() as u32);
        let mut heap = BumpAllocator::new(image_end, PhysicalAddress::new(memory::HEAP_LIMIT));
        heap.set_start(PhysicalAddress::new(memory::HEAP_START));

        let vm = VmManager::init(
            unsafe { Cp15::new() },
            heap,
            IdentityPhysMapper,
            VmConfig::default(),
        );

        let brought_up = trap::VM.with_lock(|slot| boot::bring_up(slot.insert(vm)));
        if let Err(e) = brought_up {
            panic!("cannot build the kernel address space: {e}");
        }

        let depth = probe_stack(STACK_PROBE_FRAMES);
        info!("stack grew through {depth} frames on demand");

        loop {
            spin_loop();
        }
    }

    /// Recurses with 1 KiB frames so the stack runs past its initial pages.
    #[inline(never)]
    fn probe_stack(frames: u32) -> u32 {
        let frame = black_box([0u8; 1024]);
        if frames == 0 {
            return u32::from(frame[0]);
        }
        1 + probe_stack(black_box(frames - 1)) + u32::from(frame[1023])
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        log::error!("kernel panic: {info}");
        loop {
            spin_loop();
        }
    }
}
