use bitfield_struct::bitfield;

/// SCTLR — CP15 c1 Control Register (ARM1176JZF-S).
///
/// Bits that the core defines as should-be-one or should-be-zero are kept in
/// private padding fields. Values obtained through
/// [`LoadRegisterUnsafe`](crate::LoadRegisterUnsafe) carry the hardware state
/// of those bits, so a read-modify-write round trip preserves them.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct SystemControl {
    /// Bit 0 — M: MMU enable.
    pub m_mmu_enable: bool,

    /// Bit 1 — A: strict alignment fault checking.
    pub a_alignment_check: bool,

    /// Bit 2 — C: level-one data cache enable.
    pub c_dcache_enable: bool,

    /// Bit 3 — W: write buffer enable.
    pub w_write_buffer: bool,

    /// Bits 4–6 — Should be one.
    #[bits(3, default = 0b111)]
    _sbo_4_6: u8,

    /// Bit 7 — B: big-endian (BE-32) memory system.
    pub b_big_endian: bool,

    /// Bit 8 — S: system protection (deprecated, used with R when AP = 0b00).
    pub s_system_protection: bool,

    /// Bit 9 — R: ROM protection (deprecated).
    pub r_rom_protection: bool,

    /// Bit 10 — Should be zero.
    #[bits(default = false)]
    _sbz_10: bool,

    /// Bit 11 — Z: branch prediction enable.
    pub z_branch_prediction: bool,

    /// Bit 12 — I: level-one instruction cache enable.
    pub i_icache_enable: bool,

    /// Bit 13 — V: high exception vectors at `0xFFFF_0000`.
    pub v_high_vectors: bool,

    /// Bit 14 — RR: round-robin cache replacement.
    pub rr_round_robin: bool,

    /// Bit 15 — L4: ARMv4 load-to-PC behavior.
    pub l4_armv4_thumb_interwork: bool,

    /// Bit 16 — Should be one.
    #[bits(default = true)]
    _sbo_16: bool,

    /// Bit 17 — Should be zero.
    #[bits(default = false)]
    _sbz_17: bool,

    /// Bit 18 — Should be one.
    #[bits(default = true)]
    _sbo_18: bool,

    /// Bits 19–20 — Should be zero.
    #[bits(2, default = 0)]
    _sbz_19_20: u8,

    /// Bit 21 — FI: fast interrupt configuration.
    pub fi_fast_interrupts: bool,

    /// Bit 22 — U: unaligned data access support.
    pub u_unaligned: bool,

    /// Bit 23 — XP: extended page table format (ARMv6 descriptors, subpages disabled).
    pub xp_extended_page_tables: bool,

    /// Bit 24 — VE: vectored interrupts.
    pub ve_vectored_interrupts: bool,

    /// Bit 25 — EE: exception endianness.
    pub ee_exception_endian: bool,

    /// Bit 26 — L2: level-two cache enable.
    pub l2_cache_enable: bool,

    /// Bit 27 — Should be zero.
    #[bits(default = false)]
    _sbz_27: bool,

    /// Bit 28 — TR: TEX remap enable.
    pub tr_tex_remap: bool,

    /// Bit 29 — FA: force AP (access flag) enable.
    pub fa_force_ap: bool,

    /// Bits 30–31 — Should be zero.
    #[bits(2, default = 0)]
    _sbz_30_31: u8,
}

impl SystemControl {
    /// Enables data/instruction caches, write buffer, branch prediction and the L2 cache.
    #[must_use]
    pub const fn with_all_caches(self, enabled: bool) -> Self {
        self.with_c_dcache_enable(enabled)
            .with_i_icache_enable(enabled)
            .with_w_write_buffer(enabled)
            .with_z_branch_prediction(enabled)
            .with_l2_cache_enable(enabled)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::LoadRegisterUnsafe for SystemControl {
    unsafe fn load_unsafe() -> Self {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {}, c1, c0, 0",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(value)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::StoreRegisterUnsafe for SystemControl {
    unsafe fn store_unsafe(self) {
        let value = self.into_bits();
        unsafe {
            core::arch::asm!(
                "mcr p15, 0, {}, c1, c0, 0",
                "mcr p15, 0, {zero}, c7, c5, 4",
                in(reg) value,
                zero = in(reg) 0u32,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_positions() {
        let r = SystemControl::from_bits(0)
            .with_m_mmu_enable(true)
            .with_xp_extended_page_tables(true)
            .with_i_icache_enable(true);
        assert_eq!(r.into_bits(), (1 << 0) | (1 << 12) | (1 << 23));
    }

    #[test]
    fn new_sets_should_be_one_bits() {
        let r = SystemControl::new();
        assert_eq!(r.into_bits(), 0b111 << 4 | 1 << 16 | 1 << 18);
        assert!(!r.m_mmu_enable());
    }

    #[test]
    fn caches_toggle_together() {
        let on = SystemControl::from_bits(0).with_all_caches(true);
        assert_eq!(on.into_bits(), (1 << 2) | (1 << 3) | (1 << 11) | (1 << 12) | (1 << 26));
        assert_eq!(on.with_all_caches(false).into_bits(), 0);
    }

    #[test]
    fn preserves_unknown_bits_on_round_trip() {
        let raw = 0x00C5_0878;
        let r = SystemControl::from_bits(raw).with_m_mmu_enable(true);
        assert_eq!(r.into_bits(), raw | 1);
    }
}
