use crate::{MemoryAddress, PageSize};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses,
/// i.e. addresses that are translated through the active first-level table.
/// It only carries the *kind* of address at the type level so you do not
/// accidentally hand a virtual address to code expecting a physical one.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x0040_1234);
/// assert_eq!(va.align_down::<Size4K>().as_u32(), 0x0040_1000);
/// assert_eq!(va.offset::<Size4K>(), 0x234);
/// assert!(!va.is_aligned::<Size1M>());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(MemoryAddress::new(v))
    }

    /// Alias for [`new`](Self::new).
    #[inline]
    #[must_use]
    #[doc(hidden)]
    pub const fn from_bits(v: u32) -> Self {
        Self::new(v)
    }

    /// Alias for [`as_u32`](Self::as_u32).
    #[inline]
    #[must_use]
    #[doc(hidden)]
    pub const fn into_bits(self) -> u32 {
        self.as_u32()
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u32()
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0.is_aligned::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0.align_down::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u32 {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn frame<S: PageSize>(self) -> u32 {
        self.0.frame::<S>()
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.as_u32())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<VirtualAddress> for u32 {
    #[inline]
    fn from(a: VirtualAddress) -> Self {
        a.as_u32()
    }
}

impl From<MemoryAddress> for VirtualAddress {
    #[inline]
    fn from(a: MemoryAddress) -> Self {
        Self(a)
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
