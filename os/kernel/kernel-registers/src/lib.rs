//! # Typed ARMv6 (ARM1176JZF-S) System Registers
//!
//! Bit-level models of the CP15 registers that the virtual-memory code touches,
//! built on [`bitfield_struct`]. Loading and storing goes through the
//! [`LoadRegisterUnsafe`] / [`StoreRegisterUnsafe`] traits; the actual
//! `mrc`/`mcr` implementations only exist with the `asm` feature on an ARM
//! target so the encodings can be unit tested on the host.
//!
//! | Register | Type |
//! |----------|------|
//! | c1 SCTLR | [`sctlr::SystemControl`] |
//! | c2 TTBR0 | [`ttbr0::TranslationTableBase`] |
//! | c3 DACR | [`dacr::DomainAccessControl`] |
//! | c5 DFSR | [`dfsr::DataFaultStatus`] |
//! | c6 FAR | [`far::FaultAddress`] |
//! | c13 CONTEXTIDR | [`context_id::ContextId`] |

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod context_id;
pub mod dacr;
pub mod dfsr;
pub mod far;
pub mod mmio;
pub mod sctlr;
pub mod ttbr0;

#[cfg(all(feature = "asm", target_arch = "arm"))]
pub mod cache;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require a
    /// privileged processor mode.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require a
    /// privileged processor mode.
    unsafe fn store_unsafe(self);
}
