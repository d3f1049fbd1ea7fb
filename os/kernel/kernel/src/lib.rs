//! # Raspberry Pi Kernel
//!
//! Board support around the virtual-memory crates:
//!
//! - [`uart`]: the polled mini UART the console writes to.
//! - [`boot`]: builds the kernel's identity-mapped address space and turns
//!   the MMU on.
//! - [`trap`]: exception vectors. Data aborts go through the fault pipeline
//!   in [`kernel_vmm::fault`]; every other exception is fatal.
//!
//! The entry point and panic handler live in `main.rs` and only exist on the
//! bare-metal target, so everything here can be tested on the host.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

pub mod boot;
pub mod trap;
pub mod uart;
