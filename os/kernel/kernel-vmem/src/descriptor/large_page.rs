use crate::descriptor::{AccessPermission, Descriptor};
use crate::flags::MapFlags;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, Size64K};

/// Second-level large page descriptor: maps 64 KiB.
///
/// The hardware indexes the coarse table with VA bits `[19:12]` but a large
/// page only consumes bits `[19:16]`, so the same descriptor must be written
/// to 16 consecutive slots.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct LargePageDescriptor {
    /// Bits 0–1 — Tag, always `0b01`.
    #[bits(2, default = 0b01)]
    _tag: u8,

    /// Bit 2 — B: bufferable.
    pub b_bufferable: bool,

    /// Bit 3 — C: cacheable.
    pub c_cacheable: bool,

    /// Bits 4–5 — AP: access permission.
    #[bits(2)]
    pub ap: AccessPermission,

    /// Bits 6–8 — Should be zero.
    #[bits(3, default = 0)]
    _sbz_6_8: u8,

    /// Bit 9 — APX: access permission extension.
    pub apx: bool,

    /// Bit 10 — S: shareable.
    pub s_shared: bool,

    /// Bit 11 — nG: not global.
    pub ng_not_global: bool,

    /// Bits 12–14 — TEX: memory type extension.
    #[bits(3)]
    pub tex: u8,

    /// Bit 15 — XN: execute never.
    pub xn_execute_never: bool,

    /// Bits 16–31 — Page base address >> 16.
    #[bits(16)]
    pub base_64k: u16,
}

impl LargePageDescriptor {
    pub const TAG: u32 = 0b01;
    const RESERVED: u32 = 0b111 << 6;

    /// Number of coarse-table slots one large page occupies.
    pub const REPLICAS: usize = 16;

    /// # Panics
    /// Panics if `base` is not 64 KiB aligned.
    #[must_use]
    pub const fn for_mapping(base: PhysicalAddress, flags: MapFlags) -> Self {
        assert!(base.is_aligned::<Size64K>(), "large page base must be 64K-aligned");
        Self::new()
            .with_base_64k(base.frame::<Size64K>() as u16)
            .with_ap(flags.access_permission())
            .with_apx(flags.apx())
            .with_tex(0)
            .with_c_cacheable(flags.cacheable())
            .with_b_bufferable(flags.bufferable())
            .with_xn_execute_never(flags.execute_never())
            .with_s_shared(flags.shared())
            .with_ng_not_global(flags.not_global())
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        PhysicalAddress::new((self.base_64k() as u32) << 16)
    }
}

impl Descriptor for LargePageDescriptor {
    fn encode(self) -> u32 {
        let raw = self.into_bits();
        assert_eq!(raw & 0b11, Self::TAG, "large page descriptor has wrong tag: {raw:#034b}");
        assert_eq!(
            raw & Self::RESERVED,
            0,
            "large page descriptor has reserved bits set: {raw:#034b}"
        );
        raw
    }

    fn decode(raw: u32) -> Option<Self> {
        (raw & 0b11 == Self::TAG && raw & Self::RESERVED == 0).then(|| Self::from_bits(raw))
    }
}
