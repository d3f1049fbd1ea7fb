//! # Virtual Memory Support
//!
//! ARMv6 short-descriptor paging for a bare-metal Raspberry Pi kernel
//! (`SCTLR.XP = 1`, no subpages).
//!
//! ## What you get
//! - Bit-exact [`descriptor`] types for sections, coarse tables, small and
//!   large pages.
//! - [`MapFlags`], the attribute word callers pass to the mapping functions.
//! - 16 KiB first-level and 1 KiB coarse [`table`]s with index helpers.
//! - An [`AddressSpace`] that installs write-once mappings and walks the tree.
//! - The allocator/mapper seams ([`TableAlloc`], [`HeapBounds`], [`PhysMapper`]).
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒20       | 19‒12        | 11‒0   |
//! | L1 index    | L2 index     | offset |
//! ```
//!
//! ```text
//!  TTBR0 → first-level table (4096 × 4 B)
//!            ├─ 0b10 section  ───────────────────────► 1 MiB frame
//!            └─ 0b01 coarse   → coarse table (256 × 4 B)
//!                                 ├─ 0b1x small page ─► 4 KiB frame
//!                                 └─ 0b01 large page ─► 64 KiB frame (16 replicas)
//! ```
//!
//! Every descriptor also carries an access permission and cache attributes;
//! first-level descriptors carry the 4-bit protection domain checked against
//! the DACR before the permission is.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "test-support"))]
extern crate alloc;

pub mod address_space;
pub mod descriptor;
pub mod flags;
#[cfg(any(test, feature = "test-support"))]
pub mod sim;
pub mod table;

pub use crate::address_space::{AddressSpace, MapError};
pub use crate::descriptor::AccessPermission;
pub use crate::flags::MapFlags;

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Source of physical memory for translation tables.
///
/// Returned blocks must be aligned as requested. The caller zeroes them.
pub trait TableAlloc {
    /// Allocate `bytes` at an `align`-aligned physical address, or `None` when exhausted.
    fn allocate_aligned(&mut self, bytes: u32, align: u32) -> Option<PhysicalAddress>;
}

/// Current extent of the kernel heap, consulted when classifying faults.
pub trait HeapBounds {
    /// First heap byte.
    fn heap_start(&self) -> VirtualAddress;

    /// One past the last allocated heap byte.
    fn heap_end(&self) -> VirtualAddress;
}

/// Converts physical addresses to usable references in the current address space.
///
/// On the Pi this is the identity; tests use [`sim::SimulatedRam`].
///
/// # Safety
/// - `pa` must be mapped writable in the current translation regime (or the
///   MMU must be off).
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa`.
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}
