use crate::descriptor::Descriptor;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;
use kernel_registers::dacr::Domain;

/// First-level descriptor pointing at a 1 KiB coarse second-level table.
///
/// The domain applies to every page mapped through the table.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct CoarseTableDescriptor {
    /// Bits 0–1 — Tag, always `0b01`.
    #[bits(2, default = 0b01)]
    _tag: u8,

    /// Bits 2–4 — Should be zero (bit 3 is NS).
    #[bits(3, default = 0)]
    _sbz_2_4: u8,

    /// Bits 5–8 — Protection domain.
    #[bits(4)]
    pub domain: Domain,

    /// Bit 9 — Implementation defined; must be zero.
    #[bits(default = false)]
    _imp: bool,

    /// Bits 10–31 — Coarse table base >> 10.
    #[bits(22)]
    pub base_1k: u32,
}

impl CoarseTableDescriptor {
    pub const TAG: u32 = 0b01;
    const RESERVED: u32 = 0b111 << 2 | 1 << 9;

    /// # Panics
    /// Panics if `table` is not 1 KiB aligned.
    #[must_use]
    pub const fn for_table(table: PhysicalAddress, domain: Domain) -> Self {
        assert!(table.as_u32() & 0x3FF == 0, "coarse table must be 1K-aligned");
        Self::new().with_base_1k(table.as_u32() >> 10).with_domain(domain)
    }

    /// Physical address of the second-level table.
    #[must_use]
    pub const fn table(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base_1k() << 10)
    }
}

impl Descriptor for CoarseTableDescriptor {
    fn encode(self) -> u32 {
        let raw = self.into_bits();
        assert_eq!(raw & 0b11, Self::TAG, "coarse descriptor has wrong tag: {raw:#034b}");
        assert_eq!(raw & Self::RESERVED, 0, "coarse descriptor has reserved bits set: {raw:#034b}");
        raw
    }

    fn decode(raw: u32) -> Option<Self> {
        (raw & 0b11 == Self::TAG && raw & Self::RESERVED == 0).then(|| Self::from_bits(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_and_domain_positions() {
        let c = CoarseTableDescriptor::for_table(PhysicalAddress::new(0x0014_4400), Domain::new(9));
        assert_eq!(c.encode(), 0x0014_4400 | 9 << 5 | 0b01);
        assert_eq!(c.table(), PhysicalAddress::new(0x0014_4400));
        assert_eq!(c.domain(), Domain::new(9));
    }

    #[test]
    fn decode_rejects_sbz_bits() {
        assert_eq!(CoarseTableDescriptor::decode(0x0014_4000 | 1 << 3 | 0b01), None);
        assert_eq!(CoarseTableDescriptor::decode(0x0014_4000 | 1 << 9 | 0b01), None);
        assert_eq!(CoarseTableDescriptor::decode(0x0014_4002), None);
    }

    #[test]
    #[should_panic(expected = "1K-aligned")]
    fn rejects_unaligned_table() {
        let _ = CoarseTableDescriptor::for_table(PhysicalAddress::new(0x0014_4100), Domain::new(1));
    }
}
