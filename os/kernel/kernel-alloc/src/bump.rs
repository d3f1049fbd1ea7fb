//! # Bump Allocator
//!
//! A never-freeing pointer-bump allocator over a fixed physical range. The
//! virtual-memory code takes page-table storage from it and reads the current
//! heap bounds during fault classification.
//!
//! The allocator only hands out address ranges; it never touches the memory
//! itself. Whoever maps the range in (see [`PhysMapper`](kernel_vmem::PhysMapper))
//! is responsible for initializing it.

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{HeapBounds, TableAlloc};

/// Minimum granule of every allocation.
pub const MIN_ALIGN: u32 = 8;

/// Align `addr` upwards to `align` (must be a power of two).
#[inline]
const fn align_up(addr: u32, align: u32) -> Option<u32> {
    match addr.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Pointer-bump allocator.
///
/// # Invariants
/// - `original <= start <= next <= limit`.
/// - Every returned block lies within `[start, limit)` and never overlaps an
///   earlier one.
#[derive(Debug, Clone)]
pub struct BumpAllocator {
    /// Start as configured at construction time.
    original: PhysicalAddress,
    /// Start after the last [`set_start`](Self::set_start).
    start: PhysicalAddress,
    /// Next free byte.
    next: PhysicalAddress,
    /// One past the last usable byte.
    limit: PhysicalAddress,
}

impl BumpAllocator {
    /// # Panics
    /// Panics if `start` is not [`MIN_ALIGN`]-aligned or `limit < start`.
    #[must_use]
    pub const fn new(start: PhysicalAddress, limit: PhysicalAddress) -> Self {
        assert!(start.as_u32() % MIN_ALIGN == 0, "heap start must be 8-byte aligned");
        assert!(start.as_u32() <= limit.as_u32(), "heap limit below start");
        Self {
            original: start,
            start,
            next: start,
            limit,
        }
    }

    /// The start the allocator was created with.
    #[must_use]
    pub const fn original_start(&self) -> PhysicalAddress {
        self.original
    }

    /// Moves the heap to begin at `addr`, discarding the current cursor.
    ///
    /// # Panics
    /// Panics if `addr` lies beyond the limit.
    pub fn set_start(&mut self, addr: PhysicalAddress) {
        assert!(addr <= self.limit, "heap start {addr} beyond limit {}", self.limit);
        let aligned = align_up(addr.as_u32(), MIN_ALIGN)
            .map_or(self.limit, PhysicalAddress::new)
            .min(self.limit);
        log::debug!("heap start moved from {} to {aligned}", self.start);
        self.start = aligned;
        self.next = aligned;
    }

    /// Bytes left before the limit.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.limit.as_u32() - self.next.as_u32()
    }

    /// Allocates `bytes` rounded up to [`MIN_ALIGN`].
    pub fn allocate(&mut self, bytes: u32) -> Option<PhysicalAddress> {
        self.allocate_aligned(bytes, MIN_ALIGN)
    }

    /// Allocates `bytes` at an address aligned to `align`. Padding skipped to
    /// reach the alignment is lost.
    ///
    /// # Panics
    /// Panics if `align` is not a power of two.
    pub fn allocate_aligned(&mut self, bytes: u32, align: u32) -> Option<PhysicalAddress> {
        assert!(align.is_power_of_two(), "alignment {align} is not a power of two");

        let align = align.max(MIN_ALIGN);
        let size = align_up(bytes, MIN_ALIGN)?;
        let base = align_up(self.next.as_u32(), align)?;
        let end = base.checked_add(size)?;
        if end > self.limit.as_u32() {
            log::warn!("bump allocator exhausted: {bytes} bytes at alignment {align}");
            return None;
        }

        self.next = PhysicalAddress::new(end);
        Some(PhysicalAddress::new(base))
    }
}

impl TableAlloc for BumpAllocator {
    fn allocate_aligned(&mut self, bytes: u32, align: u32) -> Option<PhysicalAddress> {
        Self::allocate_aligned(self, bytes, align)
    }
}

/// The heap is identity mapped, so its physical bounds double as virtual ones.
impl HeapBounds for BumpAllocator {
    fn heap_start(&self) -> VirtualAddress {
        VirtualAddress::new(self.start.as_u32())
    }

    fn heap_end(&self) -> VirtualAddress {
        VirtualAddress::new(self.next.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> BumpAllocator {
        BumpAllocator::new(PhysicalAddress::new(0x0014_0000), PhysicalAddress::new(0x0020_0000))
    }

    #[test]
    fn rounds_up_to_eight_bytes() {
        let mut h = heap();
        assert_eq!(h.allocate(1), Some(PhysicalAddress::new(0x0014_0000)));
        assert_eq!(h.allocate(9), Some(PhysicalAddress::new(0x0014_0008)));
        assert_eq!(h.heap_end(), VirtualAddress::new(0x0014_0018));
    }

    #[test]
    fn aligned_allocation_skips_padding() {
        let mut h = heap();
        h.allocate(8).unwrap();
        let table = h.allocate_aligned(16 * 1024, 16 * 1024).unwrap();
        assert_eq!(table, PhysicalAddress::new(0x0014_4000));
        let coarse = h.allocate_aligned(1024, 1024).unwrap();
        assert_eq!(coarse, PhysicalAddress::new(0x0014_8000));
    }

    #[test]
    fn exhaustion_returns_none_and_keeps_cursor() {
        let mut h = BumpAllocator::new(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x1400));
        assert!(h.allocate_aligned(1024, 1024).is_some());
        assert_eq!(h.allocate(8), None);
        assert_eq!(h.remaining(), 0);
        assert_eq!(h.heap_end(), VirtualAddress::new(0x1400));
    }

    #[test]
    fn set_start_moves_both_bounds() {
        let mut h = heap();
        h.allocate(64).unwrap();
        h.set_start(PhysicalAddress::new(0x0018_0003));
        assert_eq!(h.heap_start(), VirtualAddress::new(0x0018_0008));
        assert_eq!(h.heap_end(), h.heap_start());
        assert_eq!(h.original_start(), PhysicalAddress::new(0x0014_0000));
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn rejects_non_power_of_two_alignment() {
        let _ = heap().allocate_aligned(16, 24);
    }

    #[test]
    fn heap_bounds_track_allocations() {
        let mut h = heap();
        let before = h.heap_end();
        h.allocate(4096).unwrap();
        assert_eq!(h.heap_end().as_u32() - before.as_u32(), 4096);
        assert_eq!(h.heap_start(), VirtualAddress::new(0x0014_0000));
    }
}
