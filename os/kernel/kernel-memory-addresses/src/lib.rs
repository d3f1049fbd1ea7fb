//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw 32-bit memory addresses used in the ARMv6
//! page-table and fault-handling code.
//!
//! ## Overview
//!
//! This crate defines a minimal set of types that prevent mixing virtual and
//! physical addresses at compile time while remaining zero-cost wrappers around
//! `u32` values.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | An address translated through the active page table. |
//! | [`PhysicalAddress`] | RAM, page-table storage, or MMIO. |
//!
//! ## Page Sizes
//!
//! The three mapping granules of the short-descriptor translation format are
//! available as marker types that implement [`PageSize`]:
//!
//! - [`Size4K`] — 4 KiB small pages
//! - [`Size64K`] — 64 KiB large pages
//! - [`Size1M`] — 1 MiB sections
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0012_3456);
//! assert_eq!(va.frame::<Size1M>(), 0x001);
//! assert_eq!(va.align_down::<Size64K>().as_u32(), 0x0012_0000);
//! assert!(PhysicalAddress::new(0x0010_0000).is_aligned::<Size1M>());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size1M, Size4K, Size64K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_constants() {
        assert_eq!(Size4K::SIZE, 4096);
        assert_eq!(Size64K::SIZE, 64 * 1024);
        assert_eq!(Size1M::SIZE, 1024 * 1024);
        assert_eq!(Size64K::SHIFT, 16);
    }

    #[test]
    fn alignment_helpers() {
        let a = MemoryAddress::new(0x0012_3456);
        assert_eq!(a.align_down::<Size4K>().as_u32(), 0x0012_3000);
        assert_eq!(a.align_down::<Size64K>().as_u32(), 0x0012_0000);
        assert_eq!(a.align_down::<Size1M>().as_u32(), 0x0010_0000);
        assert_eq!(a.offset::<Size4K>(), 0x456);
        assert!(!a.is_aligned::<Size4K>());
        assert!(a.align_down::<Size4K>().is_aligned::<Size4K>());
    }

    #[test]
    fn frames() {
        let va = VirtualAddress::new(0xFFFF_F000);
        assert_eq!(va.frame::<Size1M>(), 0xFFF);
        assert_eq!(va.frame::<Size4K>(), 0xF_FFFF);
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{}", VirtualAddress::new(0x8000)), "0x00008000");
        assert_eq!(format!("{:?}", PhysicalAddress::new(0x8000)), "PA(0x00008000)");
        assert_eq!(format!("{:?}", VirtualAddress::new(0x1)), "VA(0x00000001)");
    }

    #[test]
    fn arithmetic() {
        let mut pa = PhysicalAddress::new(0x1000);
        pa += 0x10;
        assert_eq!((pa + 0x10).as_u32(), 0x1020);
    }
}
