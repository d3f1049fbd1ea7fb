use crate::descriptor::{AccessPermission, Descriptor};
use crate::flags::MapFlags;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, Size1M};
use kernel_registers::dacr::Domain;

/// First-level section descriptor: maps 1 MiB directly.
///
/// ```text
///  31        20 19 18 17 16 15 14  12 11 10 9  8   5 4  3 2 1 0
/// [ base[31:20] |NS|SS|nG|S |APX| TEX |  AP |IMP|domain|XN|C|B|1 0]
/// ```
///
/// `NS`, the supersection bit and `IMP` are reserved and must be zero.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct SectionDescriptor {
    /// Bits 0–1 — Tag, always `0b10`.
    #[bits(2, default = 0b10)]
    _tag: u8,

    /// Bit 2 — B: bufferable.
    pub b_bufferable: bool,

    /// Bit 3 — C: cacheable.
    pub c_cacheable: bool,

    /// Bit 4 — XN: execute never.
    pub xn_execute_never: bool,

    /// Bits 5–8 — Protection domain.
    #[bits(4)]
    pub domain: Domain,

    /// Bit 9 — Implementation defined; must be zero.
    #[bits(default = false)]
    _imp: bool,

    /// Bits 10–11 — AP: access permission.
    #[bits(2)]
    pub ap: AccessPermission,

    /// Bits 12–14 — TEX: memory type extension.
    #[bits(3)]
    pub tex: u8,

    /// Bit 15 — APX: access permission extension (read-only when set).
    pub apx: bool,

    /// Bit 16 — S: shareable.
    pub s_shared: bool,

    /// Bit 17 — nG: not global, i.e. tagged with the current ASID in the TLB.
    pub ng_not_global: bool,

    /// Bit 18 — Supersection; never used.
    #[bits(default = false)]
    _supersection: bool,

    /// Bit 19 — NS: non-secure; must be zero.
    #[bits(default = false)]
    _ns: bool,

    /// Bits 20–31 — Section base address >> 20.
    #[bits(12)]
    pub base_1m: u16,
}

impl SectionDescriptor {
    pub const TAG: u32 = 0b10;
    const RESERVED: u32 = 1 << 9 | 1 << 18 | 1 << 19;

    /// A section descriptor for `base` in `domain`, attributes taken from `flags`.
    ///
    /// # Panics
    /// Panics if `base` is not 1 MiB aligned.
    #[must_use]
    pub const fn for_mapping(base: PhysicalAddress, domain: Domain, flags: MapFlags) -> Self {
        assert!(base.is_aligned::<Size1M>(), "section base must be 1M-aligned");
        Self::new()
            .with_base_1m(base.frame::<Size1M>() as u16)
            .with_domain(domain)
            .with_ap(flags.access_permission())
            .with_apx(flags.apx())
            .with_tex(0)
            .with_c_cacheable(flags.cacheable())
            .with_b_bufferable(flags.bufferable())
            .with_xn_execute_never(flags.execute_never())
            .with_s_shared(flags.shared())
            .with_ng_not_global(flags.not_global())
    }

    /// Physical base of the mapped 1 MiB region.
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        PhysicalAddress::new((self.base_1m() as u32) << 20)
    }
}

impl Descriptor for SectionDescriptor {
    fn encode(self) -> u32 {
        let raw = self.into_bits();
        assert_eq!(raw & 0b11, Self::TAG, "section descriptor has wrong tag: {raw:#034b}");
        assert_eq!(
            raw & Self::RESERVED,
            0,
            "section descriptor has reserved bits set: {raw:#034b}"
        );
        raw
    }

    fn decode(raw: u32) -> Option<Self> {
        (raw & 0b11 == Self::TAG && raw & Self::RESERVED == 0).then(|| Self::from_bits(raw))
    }
}
