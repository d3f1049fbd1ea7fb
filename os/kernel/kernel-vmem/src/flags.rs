//! # Mapping Flags
//!
//! Caller-facing attribute word for the `map_*` operations. It is independent
//! of any descriptor layout; each shape copies the fields it understands into
//! its own bit positions.
//!
//! ```text
//!  8    7   6    5    4   3      2      1  0
//! [XN | S | nG | APX | B | C | AP set |  AP  ]
//! ```
//!
//! `AP` is only honored when the "AP set" bit is set; otherwise mappings get
//! [`AccessPermission::FullAccess`]. TEX is not expressible and always written
//! as zero.

use crate::descriptor::AccessPermission;
use bitfield_struct::bitfield;

#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct MapFlags {
    /// Bits 0–1 — Access permission, if [`explicit_ap`](Self::explicit_ap) is set.
    #[bits(2)]
    pub ap: AccessPermission,

    /// Bit 2 — Use [`ap`](Self::ap) instead of full access.
    pub explicit_ap: bool,

    /// Bit 3 — Cacheable.
    pub cacheable: bool,

    /// Bit 4 — Bufferable.
    pub bufferable: bool,

    /// Bit 5 — APX (makes the mapping read-only).
    pub apx: bool,

    /// Bit 6 — nG: entry is tagged with the ASID in the TLB.
    pub not_global: bool,

    /// Bit 7 — Shareable.
    pub shared: bool,

    /// Bit 8 — Execute never.
    pub execute_never: bool,

    #[bits(23)]
    __: u32,
}

impl MapFlags {
    /// Cacheable, bufferable kernel memory.
    pub const KERNEL: Self = Self::new().with_cacheable(true).with_bufferable(true);

    /// Strongly ordered, non-executable memory for peripheral registers.
    pub const DEVICE: Self = Self::new().with_execute_never(true);

    /// Pin the access permission to `ap`.
    #[must_use]
    pub const fn with_access(self, ap: AccessPermission) -> Self {
        self.with_ap(ap).with_explicit_ap(true)
    }

    /// The access permission a descriptor built from these flags carries.
    #[must_use]
    pub const fn access_permission(&self) -> AccessPermission {
        if self.explicit_ap() {
            self.ap()
        } else {
            AccessPermission::FullAccess
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_defaults_to_full_access() {
        let f = MapFlags::new().with_ap(AccessPermission::NoAccess);
        assert_eq!(f.access_permission(), AccessPermission::FullAccess);
        assert_eq!(
            f.with_explicit_ap(true).access_permission(),
            AccessPermission::NoAccess
        );
    }

    #[test]
    fn bit_positions() {
        assert_eq!(MapFlags::new().with_access(AccessPermission::UserReadOnly).into_bits(), 0b110);
        assert_eq!(MapFlags::KERNEL.into_bits(), 0b11 << 3);
        assert_eq!(MapFlags::new().with_apx(true).into_bits(), 1 << 5);
        assert_eq!(MapFlags::new().with_not_global(true).into_bits(), 1 << 6);
        assert_eq!(MapFlags::new().with_shared(true).into_bits(), 1 << 7);
        assert_eq!(MapFlags::DEVICE.into_bits(), 1 << 8);
    }

    #[test]
    fn raw_word_round_trips_known_bits() {
        let f = MapFlags::from_bits(0b1_0101_1101);
        assert!(f.execute_never() && f.not_global() && f.bufferable() && f.cacheable());
        assert!(!f.shared() && !f.apx());
        assert_eq!(f.access_permission(), AccessPermission::PrivilegedOnly);
    }
}
