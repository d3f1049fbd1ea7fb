use kernel_memory_addresses::VirtualAddress;

/// FAR — CP15 c6 Fault Address Register.
///
/// Holds the modified virtual address of the access that caused the most
/// recent precise data abort. Only meaningful for status codes that record it.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FaultAddress(pub VirtualAddress);

impl FaultAddress {
    #[must_use]
    pub const fn address(self) -> VirtualAddress {
        self.0
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::LoadRegisterUnsafe for FaultAddress {
    unsafe fn load_unsafe() -> Self {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {}, c6, c0, 0",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self(VirtualAddress::new(value))
    }
}
