//! # Identity PhysMapper
//!
//! The Raspberry Pi kernel identity-maps everything it touches: the kernel
//! image, the heap that backs page tables, and the peripheral window. A
//! physical address is therefore directly usable as a pointer, both before
//! and after the MMU is switched on.
//!
//! ## Example
//! ```rust,no_run
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::{PhysMapper, table::CoarseTable};
//!
//! let mapper = IdentityPhysMapper;
//! unsafe {
//!     let table: &mut CoarseTable = mapper.phys_to_mut(PhysicalAddress::new(0x0014_4000));
//!     table.zero();
//! }
//! ```

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for an identity-mapped kernel: `va == pa`.
///
/// # Safety
/// - The referenced physical range must be mapped 1:1 in the active table
///   (or the MMU must be off).
/// - The returned reference must only be used for valid, writable memory.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and identity mapped.
        unsafe { &mut *va }
    }
}
