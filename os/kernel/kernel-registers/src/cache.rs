//! CP15 c7/c8 cache, TLB and barrier maintenance operations (ARM1176JZF-S).
//!
//! Every operation is a write of zero to a CP15 register; none of them are
//! readable, so they are modeled as plain functions rather than registers.
//!
//! # Safety
//! All functions require privileged mode. Invalidating the data cache without
//! cleaning it first discards dirty lines.

macro_rules! cp15_op {
    ($(#[$meta:meta])* $name:ident, $crn:literal, $crm:literal, $op2:literal) => {
        $(#[$meta])*
        ///
        /// # Safety
        /// Must be executed in a privileged mode.
        #[inline(always)]
        pub unsafe fn $name() {
            unsafe {
                core::arch::asm!(
                    concat!("mcr p15, 0, {}, ", $crn, ", ", $crm, ", ", $op2),
                    in(reg) 0u32,
                    options(nostack, preserves_flags)
                );
            }
        }
    };
}

cp15_op!(
    /// Data synchronization barrier (`DSB`).
    data_sync_barrier, "c7", "c10", "4"
);
cp15_op!(
    /// Data memory barrier (`DMB`).
    data_memory_barrier, "c7", "c10", "5"
);
cp15_op!(
    /// Flush the prefetch buffer (`ISB`).
    prefetch_flush, "c7", "c5", "4"
);
cp15_op!(
    /// Invalidate the entire instruction cache.
    invalidate_icache, "c7", "c5", "0"
);
cp15_op!(
    /// Invalidate the entire data cache.
    invalidate_dcache, "c7", "c6", "0"
);
cp15_op!(
    /// Clean and invalidate the entire data cache.
    clean_invalidate_dcache, "c7", "c14", "0"
);
cp15_op!(
    /// Flush the branch target address cache.
    flush_branch_targets, "c7", "c5", "6"
);
cp15_op!(
    /// Invalidate the unified TLB.
    invalidate_tlb, "c8", "c7", "0"
);

/// `DSB` followed by a prefetch flush; what every CP15 state change must be bracketed with.
///
/// # Safety
/// Must be executed in a privileged mode.
#[inline(always)]
pub unsafe fn barrier() {
    unsafe {
        data_sync_barrier();
        prefetch_flush();
    }
}
