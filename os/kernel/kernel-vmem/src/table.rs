//! # Translation Tables
//!
//! - [`FirstLevelIndex`]: VA bits `[31:20]`, one slot per MiB.
//! - [`SecondLevelIndex`]: VA bits `[19:12]`, one slot per 4 KiB page.
//! - [`FirstLevelTable`]: 4096 slots, 16 KiB-aligned (the TTBR0 target).
//! - [`CoarseTable`]: 256 slots, 1 KiB-aligned.
//!
//! Tables are plain storage. Write-once and alignment policy lives in
//! [`AddressSpace`](crate::AddressSpace).

use crate::descriptor::{FirstLevelDescriptor, SecondLevelDescriptor};
use kernel_info::vm::{COARSE_ENTRIES, FIRST_LEVEL_ENTRIES};
use kernel_memory_addresses::{Size1M, VirtualAddress};

/// Index into a [`FirstLevelTable`] (derived from VA bits `[31:20]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FirstLevelIndex(u16);

/// Index into a [`CoarseTable`] (derived from VA bits `[19:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SecondLevelIndex(u8);

impl FirstLevelIndex {
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(va.frame::<Size1M>() as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 4096` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < FIRST_LEVEL_ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl SecondLevelIndex {
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u32() >> 12) & 0xFF) as u8)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The first-level table: 4096 entries, 16 KiB-aligned.
#[doc(alias = "L1")]
#[repr(C, align(16384))]
pub struct FirstLevelTable {
    entries: [FirstLevelDescriptor; FIRST_LEVEL_ENTRIES],
}

/// A coarse second-level table: 256 entries, 1 KiB-aligned.
#[doc(alias = "L2")]
#[repr(C, align(1024))]
pub struct CoarseTable {
    entries: [SecondLevelDescriptor; COARSE_ENTRIES],
}

impl FirstLevelTable {
    pub const SIZE: u32 = (FIRST_LEVEL_ENTRIES * 4) as u32;
    pub const ALIGN: u32 = 16 * 1024;

    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [FirstLevelDescriptor::FAULT; FIRST_LEVEL_ENTRIES],
        }
    }

    /// Fill every slot with the fault descriptor.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(FirstLevelDescriptor::FAULT);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: FirstLevelIndex) -> FirstLevelDescriptor {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: FirstLevelIndex, e: FirstLevelDescriptor) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> FirstLevelIndex {
        FirstLevelIndex::from(va)
    }

    /// Number of non-fault slots.
    #[must_use]
    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_fault()).count()
    }
}

impl CoarseTable {
    pub const SIZE: u32 = (COARSE_ENTRIES * 4) as u32;
    pub const ALIGN: u32 = 1024;

    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [SecondLevelDescriptor::FAULT; COARSE_ENTRIES],
        }
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(SecondLevelDescriptor::FAULT);
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: SecondLevelIndex) -> SecondLevelDescriptor {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: SecondLevelIndex, e: SecondLevelDescriptor) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> SecondLevelIndex {
        SecondLevelIndex::from(va)
    }

    /// `count` consecutive slots starting at `first`.
    ///
    /// # Panics
    /// Panics if the range runs past the end of the table.
    #[must_use]
    pub fn slots(&self, first: SecondLevelIndex, count: usize) -> &[SecondLevelDescriptor] {
        &self.entries[first.as_usize()..first.as_usize() + count]
    }

    /// Mutable variant of [`slots`](Self::slots).
    pub fn slots_mut(
        &mut self,
        first: SecondLevelIndex,
        count: usize,
    ) -> &mut [SecondLevelDescriptor] {
        &mut self.entries[first.as_usize()..first.as_usize() + count]
    }
}
