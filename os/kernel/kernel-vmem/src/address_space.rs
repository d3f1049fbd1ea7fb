//! # Address Space (ARMv6 short-descriptor, two levels)
//!
//! Builds and mutates one translation tree: a 16 KiB first-level table whose
//! slots are either sections or pointers to 1 KiB coarse tables.
//!
//! ## Highlights
//!
//! - [`AddressSpace::allocate_root`] takes a zeroed first-level table from a
//!   [`TableAlloc`].
//! - [`AddressSpace::map_section`], [`map_small_page`](AddressSpace::map_small_page)
//!   and [`map_large_page`](AddressSpace::map_large_page) install one mapping,
//!   allocating the coarse table on demand.
//! - [`AddressSpace::translate`] walks the tree in software.
//!
//! ## Write-once
//!
//! A slot goes from fault to mapped exactly once. There is no unmap, and
//! coarse tables are never returned to the allocator. Mapping over an existing
//! descriptor, or passing a misaligned address, is a caller bug and panics.
//! Running out of table memory is the only recoverable failure.
//!
//! ## Safety
//!
//! - Changing a live mapping needs TLB maintenance by the caller. Since slots
//!   only ever leave the fault state, the TLB can never hold a stale entry for
//!   them.
//! - The [`PhysMapper`] must yield writable references to table memory.

use crate::descriptor::{
    CoarseTableDescriptor, Descriptor, FirstLevelDescriptor, FirstLevelKind, LargePageDescriptor,
    SecondLevelDescriptor, SecondLevelKind, SectionDescriptor, SmallPageDescriptor,
};
use crate::flags::MapFlags;
use crate::table::{CoarseTable, FirstLevelTable};
use crate::{PhysMapper, TableAlloc};
use kernel_memory_addresses::{PhysicalAddress, Size1M, Size4K, Size64K, VirtualAddress};
use kernel_registers::dacr::Domain;

/// Large pages may not start at or beyond this coarse-table slot; the 16
/// replicas would run past the end of the table.
pub const MAX_LARGE_PAGE_INDEX: usize = 240;

/// Failure to obtain table memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("out of memory allocating a {what} ({bytes} bytes)")]
    OutOfMemory { what: &'static str, bytes: u32 },
}

/// Handle to a single translation tree.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalAddress,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate a fresh first-level table with every slot set to fault.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if `alloc` cannot provide 16 KiB at 16 KiB alignment.
    pub fn allocate_root<A: TableAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let root = alloc
            .allocate_aligned(FirstLevelTable::SIZE, FirstLevelTable::ALIGN)
            .ok_or(MapError::OutOfMemory {
                what: "first-level table",
                bytes: FirstLevelTable::SIZE,
            })?;
        let space = Self::from_root(mapper, root);
        space.first_level_mut().zero();
        log::debug!("allocated first-level table at {root}");
        Ok(space)
    }

    /// Wrap an existing first-level table.
    ///
    /// # Panics
    /// Panics if `root` is not 16 KiB aligned.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalAddress) -> Self {
        assert!(
            root.as_u32() % FirstLevelTable::ALIGN == 0,
            "first-level table must be 16K-aligned"
        );
        Self { root, mapper }
    }

    /// Physical address of the first-level table (the TTBR0 value).
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn first_level_mut(&self) -> &mut FirstLevelTable {
        // SAFETY: `root` came from a table allocator or was validated by the
        // caller of `from_root`; the mapper makes it writable.
        unsafe { self.mapper.phys_to_mut::<FirstLevelTable>(self.root) }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn coarse_mut(&self, coarse: CoarseTableDescriptor) -> &mut CoarseTable {
        // SAFETY: coarse descriptors are only installed by this type and
        // always point at a table obtained from `TableAlloc`.
        unsafe { self.mapper.phys_to_mut::<CoarseTable>(coarse.table()) }
    }

    /// The first-level slot covering `va`.
    #[must_use]
    pub fn lookup_first_level(&self, va: VirtualAddress) -> FirstLevelDescriptor {
        self.first_level_mut().get(FirstLevelTable::index_of(va))
    }

    /// The second-level slot covering `va` inside the coarse table `coarse`
    /// points to.
    #[must_use]
    pub fn lookup_second_level(
        &self,
        coarse: CoarseTableDescriptor,
        va: VirtualAddress,
    ) -> SecondLevelDescriptor {
        self.coarse_mut(coarse).get(CoarseTable::index_of(va))
    }

    /// Map the 1 MiB section at `va` to `pa`.
    ///
    /// # Panics
    /// - `va` or `pa` is not 1 MiB aligned.
    /// - The first-level slot is not fault.
    pub fn map_section(
        &self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        domain: Domain,
        flags: MapFlags,
    ) -> SectionDescriptor {
        assert!(va.is_aligned::<Size1M>(), "section va {va} is not 1M-aligned");
        assert!(pa.is_aligned::<Size1M>(), "section pa {pa} is not 1M-aligned");

        let table = self.first_level_mut();
        let idx = FirstLevelTable::index_of(va);
        let current = table.get(idx);
        assert!(current.is_fault(), "section {va} already mapped: {current:?}");

        let section = SectionDescriptor::for_mapping(pa, domain, flags);
        table.set(idx, section.into());
        log::trace!("map section {va} -> {pa}: {section:?}");
        section
    }

    /// Map the 4 KiB page at `va` to `pa`, creating the coarse table if needed.
    ///
    /// When the coarse table already exists, its domain is kept and `domain`
    /// is ignored.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a coarse table is needed and cannot be allocated.
    ///
    /// # Panics
    /// - `va` or `pa` is not 4 KiB aligned.
    /// - The first-level slot holds a section.
    /// - The second-level slot is not fault.
    pub fn map_small_page<A: TableAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        domain: Domain,
        flags: MapFlags,
    ) -> Result<SmallPageDescriptor, MapError> {
        assert!(va.is_aligned::<Size4K>(), "small page va {va} is not 4K-aligned");
        assert!(pa.is_aligned::<Size4K>(), "small page pa {pa} is not 4K-aligned");

        let coarse = self.ensure_coarse(alloc, va, domain)?;
        let table = self.coarse_mut(coarse);
        let idx = CoarseTable::index_of(va);
        let current = table.get(idx);
        assert!(current.is_fault(), "small page {va} already mapped: {current:?}");

        let page = SmallPageDescriptor::for_mapping(pa, flags);
        table.set(idx, page.into());
        log::trace!("map small page {va} -> {pa}: {page:?}");
        Ok(page)
    }

    /// Map the 64 KiB page at `va` to `pa`, writing the descriptor into all 16
    /// slots it spans.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a coarse table is needed and cannot be allocated.
    ///
    /// # Panics
    /// - `va` or `pa` is not 64 KiB aligned.
    /// - The second-level index of `va` is not below [`MAX_LARGE_PAGE_INDEX`].
    /// - The first-level slot holds a section.
    /// - Any of the 16 second-level slots is not fault.
    pub fn map_large_page<A: TableAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        domain: Domain,
        flags: MapFlags,
    ) -> Result<LargePageDescriptor, MapError> {
        assert!(va.is_aligned::<Size64K>(), "large page va {va} is not 64K-aligned");
        assert!(pa.is_aligned::<Size64K>(), "large page pa {pa} is not 64K-aligned");
        let first = CoarseTable::index_of(va);
        assert!(
            first.as_usize() < MAX_LARGE_PAGE_INDEX,
            "large page {va} starts at coarse slot {} (limit {MAX_LARGE_PAGE_INDEX})",
            first.as_usize()
        );

        let coarse = self.ensure_coarse(alloc, va, domain)?;
        let slots = self
            .coarse_mut(coarse)
            .slots_mut(first, LargePageDescriptor::REPLICAS);
        if let Some(taken) = slots.iter().position(|s| !s.is_fault()) {
            panic!(
                "large page {va} overlaps mapped slot {}: {:?}",
                first.as_usize() + taken,
                slots[taken]
            );
        }

        let page = LargePageDescriptor::for_mapping(pa, flags);
        slots.fill(page.into());
        log::trace!("map large page {va} -> {pa}: {page:?}");
        Ok(page)
    }

    /// The coarse table covering `va`, allocated and linked if the slot is fault.
    fn ensure_coarse<A: TableAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        domain: Domain,
    ) -> Result<CoarseTableDescriptor, MapError> {
        let table = self.first_level_mut();
        let idx = FirstLevelTable::index_of(va);
        match table.get(idx).kind() {
            FirstLevelKind::Coarse(coarse) => Ok(coarse),
            FirstLevelKind::Fault => {
                let pa = alloc
                    .allocate_aligned(CoarseTable::SIZE, CoarseTable::ALIGN)
                    .ok_or(MapError::OutOfMemory {
                        what: "coarse table",
                        bytes: CoarseTable::SIZE,
                    })?;
                let coarse = CoarseTableDescriptor::for_table(pa, domain);
                self.coarse_mut(coarse).zero();
                table.set(idx, coarse.into());
                log::debug!(
                    "coarse table for {} at {pa}: {coarse:?}",
                    va.align_down::<Size1M>()
                );
                Ok(coarse)
            }
            other => panic!("cannot map pages under {va}: first-level slot is {other:?}"),
        }
    }

    /// Software table walk.
    ///
    /// Returns `None` if `va` is not mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match self.lookup_first_level(va).kind() {
            FirstLevelKind::Section(s) => Some(s.base() + va.offset::<Size1M>()),
            FirstLevelKind::Coarse(c) => match self.lookup_second_level(c, va).kind() {
                SecondLevelKind::Small(p) => Some(p.base() + va.offset::<Size4K>()),
                SecondLevelKind::Large(p) => Some(p.base() + va.offset::<Size64K>()),
                SecondLevelKind::Fault | SecondLevelKind::Unsupported(_) => None,
            },
            FirstLevelKind::Fault | FirstLevelKind::Unsupported(_) => None,
        }
    }

    /// Number of mapped first-level slots (sections and coarse tables).
    #[must_use]
    pub fn first_level_mapped(&self) -> usize {
        self.first_level_mut().mapped_count()
    }

    /// Raw words of the 16 replicas of the large page covering `va`, if the
    /// first-level slot points at a coarse table.
    pub fn large_page_replicas(
        &self,
        va: VirtualAddress,
    ) -> Option<[u32; LargePageDescriptor::REPLICAS]> {
        let FirstLevelKind::Coarse(c) = self.lookup_first_level(va).kind() else {
            return None;
        };
        let first = CoarseTable::index_of(va.align_down::<Size64K>());
        let mut out = [0; LargePageDescriptor::REPLICAS];
        let slots = self
            .coarse_mut(c)
            .slots(first, LargePageDescriptor::REPLICAS);
        for (o, s) in out.iter_mut().zip(slots) {
            *o = s.raw();
        }
        Some(out)
    }
}
