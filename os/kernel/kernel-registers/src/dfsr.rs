use bitfield_struct::bitfield;

/// DFSR — CP15 c5 Data Fault Status Register (ARMv6).
///
/// The fault status is split in two: `FS[3:0]` in bits 0–3 and `FS[4]` in
/// bit 10. Use [`status`](Self::status) to obtain the combined 5-bit value.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct DataFaultStatus {
    /// Bits 0–3 — FS[3:0]: low four bits of the fault status.
    #[bits(4)]
    pub fs_low: u8,

    /// Bits 4–7 — Domain of the access that faulted (valid for some status codes only).
    #[bits(4)]
    pub domain: u8,

    /// Bits 8–9 — Should be zero.
    #[bits(2, default = 0)]
    _sbz_8_9: u8,

    /// Bit 10 — FS[4]: high bit of the fault status.
    pub fs_high: bool,

    /// Bit 11 — WnR: the faulting access was a write.
    pub wnr_write: bool,

    /// Bit 12 — SD: external abort was an AXI slave error rather than a decode error.
    pub sd_slave_error: bool,

    /// Bits 13–31 — Should be zero.
    #[bits(19, default = 0)]
    _sbz_13_31: u32,
}

impl DataFaultStatus {
    /// The combined 5-bit fault status `FS[4:0]`.
    #[must_use]
    pub const fn status(&self) -> u8 {
        self.fs_low() | ((self.fs_high() as u8) << 4)
    }

    /// Builds a register image for the given status, domain and direction.
    #[must_use]
    pub const fn from_parts(status: u8, domain: u8, write: bool) -> Self {
        Self::new()
            .with_fs_low(status & 0xF)
            .with_fs_high(status & 0x10 != 0)
            .with_domain(domain & 0xF)
            .with_wnr_write(write)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::LoadRegisterUnsafe for DataFaultStatus {
    unsafe fn load_unsafe() -> Self {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {}, c5, c0, 0",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(value)
    }
}
