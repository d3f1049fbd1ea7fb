//! Volatile 32-bit device register access.

use kernel_memory_addresses::PhysicalAddress;

/// Reads a 32-bit device register.
///
/// # Safety
/// `addr` must be a valid, mapped, 4-byte aligned device register.
#[inline]
#[must_use]
pub unsafe fn read32(addr: PhysicalAddress) -> u32 {
    unsafe { core::ptr::read_volatile(addr.as_u32() as usize as *const u32) }
}

/// Writes a 32-bit device register.
///
/// # Safety
/// `addr` must be a valid, mapped, 4-byte aligned device register.
#[inline]
pub unsafe fn write32(addr: PhysicalAddress, value: u32) {
    unsafe { core::ptr::write_volatile(addr.as_u32() as usize as *mut u32, value) }
}
