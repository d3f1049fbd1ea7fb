use bitfield_struct::bitfield;

/// CONTEXTIDR — CP15 c13 Context ID Register.
///
/// The low byte is the ASID that tags non-global TLB entries; the upper
/// 24 bits are the process id, used only for tracing and debug.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct ContextId {
    /// Bits 0–7 — Address space identifier.
    #[bits(8)]
    pub asid: u8,

    /// Bits 8–31 — Process identifier.
    #[bits(24)]
    pub process_id: u32,
}

impl ContextId {
    /// The value installed while TTBR0 is being changed: ASID 0 is never handed
    /// out, so no live TLB entry can be tagged with it.
    pub const RESERVED: Self = Self::new();

    /// Largest value the 24-bit process id field holds.
    pub const MAX_PROCESS_ID: u32 = (1 << 24) - 1;

    #[must_use]
    pub const fn for_process(process_id: u32, asid: u8) -> Self {
        Self::new().with_process_id(process_id).with_asid(asid)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::LoadRegisterUnsafe for ContextId {
    unsafe fn load_unsafe() -> Self {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {}, c13, c0, 1",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(value)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::StoreRegisterUnsafe for ContextId {
    unsafe fn store_unsafe(self) {
        let value = self.into_bits();
        unsafe {
            core::arch::asm!(
                "mcr p15, 0, {}, c13, c0, 1",
                "mcr p15, 0, {zero}, c7, c5, 4",
                in(reg) value,
                zero = in(reg) 0u32,
                options(nostack, preserves_flags)
            );
        }
    }
}
