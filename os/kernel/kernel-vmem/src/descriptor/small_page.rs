use crate::descriptor::{AccessPermission, Descriptor};
use crate::flags::MapFlags;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, Size4K};

/// Second-level small page descriptor: maps 4 KiB.
///
/// Bit 1 is the tag; bit 0 doubles as the execute-never bit, so a small page
/// reads as `0b10` or `0b11` in bits `[1:0]`.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct SmallPageDescriptor {
    /// Bit 0 — XN: execute never.
    pub xn_execute_never: bool,

    /// Bit 1 — Tag, always set.
    #[bits(default = true)]
    _tag: bool,

    /// Bit 2 — B: bufferable.
    pub b_bufferable: bool,

    /// Bit 3 — C: cacheable.
    pub c_cacheable: bool,

    /// Bits 4–5 — AP: access permission.
    #[bits(2)]
    pub ap: AccessPermission,

    /// Bits 6–8 — TEX: memory type extension.
    #[bits(3)]
    pub tex: u8,

    /// Bit 9 — APX: access permission extension.
    pub apx: bool,

    /// Bit 10 — S: shareable.
    pub s_shared: bool,

    /// Bit 11 — nG: not global.
    pub ng_not_global: bool,

    /// Bits 12–31 — Page base address >> 12.
    #[bits(20)]
    pub base_4k: u32,
}

impl SmallPageDescriptor {
    pub const TAG_BIT: u32 = 0b10;

    /// # Panics
    /// Panics if `base` is not 4 KiB aligned.
    #[must_use]
    pub const fn for_mapping(base: PhysicalAddress, flags: MapFlags) -> Self {
        assert!(base.is_aligned::<Size4K>(), "small page base must be 4K-aligned");
        Self::new()
            .with_base_4k(base.frame::<Size4K>())
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
        PhysicalAddress::new(self.base_4k() << 12)
    }
}

impl Descriptor for SmallPageDescriptor {
    fn encode(self) -> u32 {
        let raw = self.into_bits();
        assert_ne!(raw & Self::TAG_BIT, 0, "small page descriptor has wrong tag: {raw:#034b}");
        raw
    }

    fn decode(raw: u32) -> Option<Self> {
        (raw & Self::TAG_BIT != 0).then(|| Self::from_bits(raw))
    }
}
