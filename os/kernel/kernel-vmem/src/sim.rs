//! # Simulated Physical Memory
//!
//! Host-side RAM for exercising table code without hardware. A contiguous,
//! 16 KiB-aligned buffer stands in for the physical range
//! `[base, base + len)`; [`PhysMapper`] translates into it.

use crate::{PhysMapper, TableAlloc};
use alloc::boxed::Box;
use core::cell::UnsafeCell;
use kernel_memory_addresses::PhysicalAddress;

const BLOCK: usize = 16 * 1024;

#[repr(C, align(16384))]
struct Block([u8; BLOCK]);

/// A zero-filled block of memory pretending to live at a physical address.
pub struct SimulatedRam {
    base: PhysicalAddress,
    len: u32,
    blocks: Box<[UnsafeCell<Block>]>,
}

impl SimulatedRam {
    /// # Panics
    /// Panics if `base` is not 16 KiB aligned.
    #[must_use]
    pub fn new(base: PhysicalAddress, len: u32) -> Self {
        assert_eq!(base.as_u32() as usize % BLOCK, 0, "simulated RAM base must be 16K-aligned");
        let count = (len as usize).div_ceil(BLOCK);
        let blocks = (0..count).map(|_| UnsafeCell::new(Block([0; BLOCK]))).collect();
        Self { base, len, blocks }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// One past the last simulated byte.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u32() + self.len)
    }

    /// A bump allocator handing out the whole simulated range.
    #[must_use]
    pub const fn allocator(&self) -> SimAlloc {
        SimAlloc {
            base: self.base,
            next: self.base.as_u32(),
            limit: self.base.as_u32() + self.len,
        }
    }

    fn host_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        assert!(
            pa >= self.base && pa < self.end(),
            "physical address {pa} outside simulated RAM"
        );
        let off = (pa.as_u32() - self.base.as_u32()) as usize;
        // Blocks are contiguous, so the byte offset can run across them.
        UnsafeCell::raw_get(self.blocks.as_ptr()).cast::<u8>().wrapping_add(off)
    }

    /// Read a word, e.g. to inspect a raw descriptor.
    #[must_use]
    pub fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        // SAFETY: in range (checked) and the buffer is 16K-aligned.
        unsafe { self.host_ptr(pa).cast::<u32>().read() }
    }
}

impl PhysMapper for SimulatedRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        assert!(
            pa.as_u32() + size_of::<T>() as u32 <= self.end().as_u32(),
            "{} bytes at {pa} exceed simulated RAM",
            size_of::<T>()
        );
        // SAFETY: caller guarantees `T` matches the bytes at `pa`; the range
        // lies inside `blocks`, which are only reachable through `UnsafeCell`.
        unsafe { &mut *self.host_ptr(pa).cast::<T>() }
    }
}

/// Bump allocator over a [`SimulatedRam`] range.
#[derive(Debug, Clone)]
pub struct SimAlloc {
    base: PhysicalAddress,
    next: u32,
    limit: u32,
}

impl SimAlloc {
    /// Bytes handed out so far, including alignment padding.
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.next - self.base.as_u32()
    }
}

impl TableAlloc for SimAlloc {
    fn allocate_aligned(&mut self, bytes: u32, align: u32) -> Option<PhysicalAddress> {
        let start = self.next.checked_add(align - 1)? & !(align - 1);
        let end = start.checked_add(bytes)?;
        if end > self.limit {
            return None;
        }
        self.next = end;
        Some(PhysicalAddress::new(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapper_writes_are_visible_to_reads() {
        let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 32 * 1024);
        unsafe {
            *ram.phys_to_mut::<u32>(PhysicalAddress::new(0x0010_4004)) = 0xDEAD_BEEF;
        }
        assert_eq!(ram.read_u32(PhysicalAddress::new(0x0010_4004)), 0xDEAD_BEEF);
        assert_eq!(ram.read_u32(PhysicalAddress::new(0x0010_4000)), 0);
    }

    #[test]
    fn allocator_respects_alignment_and_limit() {
        let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 20 * 1024);
        let mut a = ram.allocator();
        assert_eq!(a.allocate_aligned(8, 8), Some(PhysicalAddress::new(0x0010_0000)));
        assert_eq!(a.allocate_aligned(1024, 1024), Some(PhysicalAddress::new(0x0010_0400)));
        assert_eq!(a.allocate_aligned(16 * 1024, 16 * 1024), None);
        assert_eq!(a.used(), 0x800);
    }

    #[test]
    #[should_panic(expected = "outside simulated RAM")]
    fn reads_outside_range_panic() {
        let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 1024);
        let _ = ram.read_u32(PhysicalAddress::new(0x0020_0000));
    }
}
