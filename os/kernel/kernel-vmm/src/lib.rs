//! # Virtual Memory Manager
//!
//! Ties the page-table code in [`kernel_vmem`] to the processor:
//!
//! - [`mmu`]: the CP15 port ([`MmuRegisters`]) and the enable/disable/cache
//!   sequences.
//! - [`environment`]: isolated address spaces with their own domain, ASID and
//!   process id, owned by a single [`VmManager`].
//! - [`fault`]: the data-abort pipeline, which grows the system stack on
//!   demand and turns every other abort into a [`FatalFault`].
//!
//! ```rust,ignore
//! let cp15 = unsafe { Cp15::new() };
//! let mut vm = VmManager::init(cp15, heap, IdentityPhysMapper, VmConfig::default());
//! let env = vm.allocate()?;
//! vm.map_section(env, kernel_va, kernel_pa, MapFlags::KERNEL);
//! vm.switch_to(env);
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "test-support"))]
extern crate alloc;

pub mod environment;
pub mod fault;
pub mod mmu;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use crate::environment::{EnvId, Environment, VmConfig, VmError, VmManager};
pub use crate::fault::{DataAbort, FatalFault, FatalReason, FaultResolution, FaultStatus};
#[cfg(all(feature = "asm", target_arch = "arm"))]
pub use crate::mmu::Cp15;
pub use crate::mmu::{Mmu, MmuRegisters};
