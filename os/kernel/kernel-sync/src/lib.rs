//! # Kernel synchronization primitives
//!
//! The Pi kernel runs on a single core, so the only source of concurrency is
//! an exception preempting the running code. [`IrqLock`] guards state shared
//! with exception handlers by masking IRQs for as long as it is held, and
//! turns an accidental nested acquisition into a panic instead of a hang.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod irq_lock;

pub use irq::IrqGuard;
pub use irq_lock::{IrqLock, IrqLockGuard};
