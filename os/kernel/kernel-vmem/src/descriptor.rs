//! # Short-Descriptor Translation Table Entries (ARMv6, `SCTLR.XP = 1`)
//!
//! One bitfield type per hardware descriptor shape:
//!
//! | Level | Shape | Type |
//! |-------|-------|------|
//! | first | 1 MiB section | [`SectionDescriptor`] |
//! | first | pointer to a coarse table | [`CoarseTableDescriptor`] |
//! | second | 4 KiB small page | [`SmallPageDescriptor`] |
//! | second | 64 KiB large page | [`LargePageDescriptor`] |
//!
//! All shapes implement [`Descriptor`], which packs into and unpacks from the
//! raw 32-bit word stored in a table. Packing asserts that reserved bits are
//! zero and the tag matches; unpacking returns `None` for words of a different
//! shape.
//!
//! Table slots hold raw words ([`FirstLevelDescriptor`], [`SecondLevelDescriptor`])
//! and are classified with `kind()`.

mod coarse;
mod large_page;
mod section;
mod small_page;

pub use coarse::CoarseTableDescriptor;
pub use large_page::LargePageDescriptor;
pub use section::SectionDescriptor;
pub use small_page::SmallPageDescriptor;

/// Pack/unpack contract for a hardware descriptor shape.
pub trait Descriptor: Sized + Copy {
    /// Produce the word the MMU reads.
    ///
    /// # Panics
    /// Panics if the tag does not match the shape or a reserved bit is set;
    /// either means the descriptor was assembled incorrectly.
    fn encode(self) -> u32;

    /// Interpret `raw` as this shape, or `None` if it is a different shape
    /// or has reserved bits set.
    fn decode(raw: u32) -> Option<Self>;
}

/// Access permission bits `AP[1:0]` (with `APX = 0`).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum AccessPermission {
    /// No access at any privilege level.
    #[default]
    NoAccess = 0b00,
    /// Privileged read/write, no user access.
    PrivilegedOnly = 0b01,
    /// Privileged read/write, user read-only.
    UserReadOnly = 0b10,
    /// Read/write at any privilege level.
    FullAccess = 0b11,
}

impl AccessPermission {
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::NoAccess,
            0b01 => Self::PrivilegedOnly,
            0b10 => Self::UserReadOnly,
            _ => Self::FullAccess,
        }
    }
}

/// A raw first-level table slot.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct FirstLevelDescriptor(u32);

/// Decoded view of a [`FirstLevelDescriptor`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FirstLevelKind {
    /// Tag `0b00`: unmapped.
    Fault,
    /// Tag `0b01`: points to a coarse second-level table.
    Coarse(CoarseTableDescriptor),
    /// Tag `0b10`: 1 MiB section.
    Section(SectionDescriptor),
    /// Anything this kernel never writes: tag `0b11`, supersections, or set reserved bits.
    Unsupported(u32),
}

impl FirstLevelDescriptor {
    pub const FAULT: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The 2-bit tag in bits `[1:0]`.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u8 {
        (self.0 & 0b11) as u8
    }

    #[inline]
    #[must_use]
    pub const fn is_fault(self) -> bool {
        self.tag() == 0b00
    }

    #[must_use]
    pub fn kind(self) -> FirstLevelKind {
        match self.tag() {
            0b00 => FirstLevelKind::Fault,
            0b01 => CoarseTableDescriptor::decode(self.0)
                .map_or(FirstLevelKind::Unsupported(self.0), FirstLevelKind::Coarse),
            0b10 => SectionDescriptor::decode(self.0)
                .map_or(FirstLevelKind::Unsupported(self.0), FirstLevelKind::Section),
            _ => FirstLevelKind::Unsupported(self.0),
        }
    }
}

impl From<SectionDescriptor> for FirstLevelDescriptor {
    fn from(value: SectionDescriptor) -> Self {
        Self(value.encode())
    }
}

impl From<CoarseTableDescriptor> for FirstLevelDescriptor {
    fn from(value: CoarseTableDescriptor) -> Self {
        Self(value.encode())
    }
}

impl core::fmt::Debug for FirstLevelDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            FirstLevelKind::Fault => f.write_str("FLD(fault)"),
            FirstLevelKind::Coarse(d) => write!(f, "FLD({d:?})"),
            FirstLevelKind::Section(d) => write!(f, "FLD({d:?})"),
            FirstLevelKind::Unsupported(raw) => write!(f, "FLD(unsupported 0b{raw:032b})"),
        }
    }
}

/// A raw second-level (coarse table) slot.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct SecondLevelDescriptor(u32);

/// Decoded view of a [`SecondLevelDescriptor`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SecondLevelKind {
    /// Bits `[1:0] = 0b00`: unmapped.
    Fault,
    /// Bits `[1:0] = 0b01`: one of the 16 replicas of a 64 KiB page.
    Large(LargePageDescriptor),
    /// Bit 1 set: 4 KiB page (bit 0 is its XN bit).
    Small(SmallPageDescriptor),
    /// A large-page tag with reserved bits set.
    Unsupported(u32),
}

impl SecondLevelDescriptor {
    pub const FAULT: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_fault(self) -> bool {
        self.0 & 0b11 == 0
    }

    #[must_use]
    pub fn kind(self) -> SecondLevelKind {
        match self.0 & 0b11 {
            0b00 => SecondLevelKind::Fault,
            0b01 => LargePageDescriptor::decode(self.0)
                .map_or(SecondLevelKind::Unsupported(self.0), SecondLevelKind::Large),
            _ => SecondLevelKind::Small(SmallPageDescriptor::from_bits(self.0)),
        }
    }
}

impl From<SmallPageDescriptor> for SecondLevelDescriptor {
    fn from(value: SmallPageDescriptor) -> Self {
        Self(value.encode())
    }
}

impl From<LargePageDescriptor> for SecondLevelDescriptor {
    fn from(value: LargePageDescriptor) -> Self {
        Self(value.encode())
    }
}

impl core::fmt::Debug for SecondLevelDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            SecondLevelKind::Fault => f.write_str("SLD(fault)"),
            SecondLevelKind::Large(d) => write!(f, "SLD({d:?})"),
            SecondLevelKind::Small(d) => write!(f, "SLD({d:?})"),
            SecondLevelKind::Unsupported(raw) => write!(f, "SLD(unsupported 0b{raw:032b})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_registers::dacr::Domain;
    use proptest::prelude::*;

    #[test]
    fn first_level_classification() {
        assert_eq!(FirstLevelDescriptor::FAULT.kind(), FirstLevelKind::Fault);
        assert!(matches!(
            FirstLevelDescriptor::from_raw(0x0014_4001 | 3 << 5).kind(),
            FirstLevelKind::Coarse(c) if c.domain() == Domain::new(3)
        ));
        assert!(matches!(
            FirstLevelDescriptor::from_raw(0x2020_0002).kind(),
            FirstLevelKind::Section(s) if s.base_1m() == 0x202
        ));
        assert_eq!(
            FirstLevelDescriptor::from_raw(0b11).kind(),
            FirstLevelKind::Unsupported(0b11)
        );
        // supersection bit
        assert!(matches!(
            FirstLevelDescriptor::from_raw(1 << 18 | 0b10).kind(),
            FirstLevelKind::Unsupported(_)
        ));
    }

    #[test]
    fn second_level_classification_uses_low_two_bits() {
        assert_eq!(SecondLevelDescriptor::FAULT.kind(), SecondLevelKind::Fault);
        assert!(matches!(
            SecondLevelDescriptor::from_raw(0x0001_0001).kind(),
            SecondLevelKind::Large(_)
        ));
        // small page with XN set: bits [1:0] = 0b11
        assert!(matches!(
            SecondLevelDescriptor::from_raw(0x0000_1003).kind(),
            SecondLevelKind::Small(p) if p.xn_execute_never() && p.base_4k() == 1
        ));
        assert!(matches!(
            SecondLevelDescriptor::from_raw(0x0000_1002).kind(),
            SecondLevelKind::Small(p) if !p.xn_execute_never()
        ));
    }

    #[test]
    fn access_permission_bits() {
        for bits in 0..4 {
            assert_eq!(AccessPermission::from_bits(bits).into_bits(), bits);
        }
        assert_eq!(AccessPermission::FullAccess.into_bits(), 0b11);
    }

    #[test]
    fn slot_debug_output() {
        assert_eq!(format!("{:?}", FirstLevelDescriptor::FAULT), "FLD(fault)");
        assert_eq!(format!("{:?}", SecondLevelDescriptor::FAULT), "SLD(fault)");
    }

    proptest! {
        #[test]
        fn section_decode_encode_is_identity(
            base in 0u32..0x1000,
            dom in 0u8..16,
            ap in 0u8..4,
            tex in 0u8..8,
            flags in 0u32..64,
        ) {
            let raw = base << 20 | (flags & 0b111) << 2 | u32::from(dom) << 5 | u32::from(ap) << 10
                | u32::from(tex) << 12 | (flags >> 3) << 15 | 0b10;
            let d = SectionDescriptor::decode(raw).expect("valid section");
            prop_assert_eq!(d.encode(), raw);
            prop_assert_eq!(FirstLevelDescriptor::from(d).raw(), raw);
        }

        #[test]
        fn coarse_decode_encode_is_identity(base in 0u32..0x40_0000, dom in 0u8..16) {
            let raw = base << 10 | u32::from(dom) << 5 | 0b01;
            let d = CoarseTableDescriptor::decode(raw).expect("valid coarse descriptor");
            prop_assert_eq!(d.encode(), raw);
            prop_assert_eq!(d.domain(), Domain::new(dom));
        }

        #[test]
        fn small_page_decode_encode_is_identity(raw in any::<u32>()) {
            let raw = raw | SmallPageDescriptor::TAG_BIT;
            let d = SmallPageDescriptor::decode(raw).expect("valid small page");
            prop_assert_eq!(d.encode(), raw);
            prop_assert!(matches!(
                SecondLevelDescriptor::from_raw(raw).kind(),
                SecondLevelKind::Small(_)
            ));
        }

        #[test]
        fn large_page_decode_encode_is_identity(raw in any::<u32>()) {
            let raw = (raw & !(0b111 << 6) & !0b11) | 0b01;
            let d = LargePageDescriptor::decode(raw).expect("valid large page");
            prop_assert_eq!(d.encode(), raw);
            prop_assert_eq!(SecondLevelDescriptor::from(d).raw(), raw);
        }
    }
}
