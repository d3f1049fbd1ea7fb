use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// TTBR0 — CP15 c2 Translation Table Base Register 0 (ARMv6, TTBCR.N = 0).
///
/// Holds the physical base of the 16 KiB first-level table together with the
/// memory attributes used for hardware table walks.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct TranslationTableBase {
    /// Bit 0 — C: table walks are inner cacheable.
    pub c_inner_cacheable: bool,

    /// Bit 1 — S: table walks are to shareable memory.
    pub s_shared: bool,

    /// Bit 2 — P: ECC enable for the memory the table lives in.
    pub p_ecc: bool,

    /// Bits 3–4 — RGN: outer cacheable attributes for table walks.
    #[bits(2)]
    pub rgn_outer: u8,

    /// Bits 5–13 — Should be zero (table must be 16 KiB aligned).
    #[bits(9, default = 0)]
    _sbz_5_13: u16,

    /// Bits 14–31 — First-level table base >> 14.
    #[bits(18)]
    table_base_16k: u32,
}

impl TranslationTableBase {
    /// Builds a TTBR0 value for a first-level table with uncached walks.
    ///
    /// # Panics
    /// Panics if `table` is not 16 KiB aligned.
    #[must_use]
    pub const fn from_table(table: PhysicalAddress) -> Self {
        assert!(
            table.as_u32() & 0x3FFF == 0,
            "first-level table must be 16K-aligned"
        );
        Self::new().with_table_base_16k(table.as_u32() >> 14)
    }

    /// Physical address of the first-level table.
    #[must_use]
    pub const fn table(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.table_base_16k() << 14)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::LoadRegisterUnsafe for TranslationTableBase {
    unsafe fn load_unsafe() -> Self {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {}, c2, c0, 0",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(value)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::StoreRegisterUnsafe for TranslationTableBase {
    unsafe fn store_unsafe(self) {
        let value = self.into_bits();
        unsafe {
            core::arch::asm!(
                "mcr p15, 0, {}, c2, c0, 0",
                in(reg) value,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_base_round_trip() {
        let ttbr = TranslationTableBase::from_table(PhysicalAddress::new(0x0010_C000));
        assert_eq!(ttbr.into_bits(), 0x0010_C000);
        assert_eq!(ttbr.table(), PhysicalAddress::new(0x0010_C000));
    }

    #[test]
    #[should_panic(expected = "16K-aligned")]
    fn rejects_unaligned_table() {
        let _ = TranslationTableBase::from_table(PhysicalAddress::new(0x0010_1000));
    }
}
