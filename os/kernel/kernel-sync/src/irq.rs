//! IRQ masking through the `I` bit of the ARM1176 `CPSR`.
//!
//! On targets other than ARM the status register is modelled by a process-wide
//! atomic so the locking logic can be exercised by host tests.

use core::marker::PhantomData;

/// `CPSR.I`: IRQs are masked while set.
pub const CPSR_IRQ_DISABLE: u32 = 1 << 7;

#[cfg(target_arch = "arm")]
mod arch {
    #[inline]
    pub fn cpsr() -> u32 {
        let r: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, cpsr",
                out(reg) r,
                options(nomem, nostack, preserves_flags)
            );
        }
        r
    }

    #[inline]
    pub fn mask() {
        unsafe { core::arch::asm!("cpsid i", options(nostack, preserves_flags)) }
    }

    #[inline]
    pub fn unmask() {
        unsafe { core::arch::asm!("cpsie i", options(nostack, preserves_flags)) }
    }
}

#[cfg(not(target_arch = "arm"))]
mod arch {
    use core::sync::atomic::{AtomicU32, Ordering};

    static CPSR: AtomicU32 = AtomicU32::new(0);

    pub fn cpsr() -> u32 {
        CPSR.load(Ordering::SeqCst)
    }

    pub fn mask() {
        CPSR.fetch_or(super::CPSR_IRQ_DISABLE, Ordering::SeqCst);
    }

    pub fn unmask() {
        CPSR.fetch_and(!super::CPSR_IRQ_DISABLE, Ordering::SeqCst);
    }
}

/// Returns the current program status register.
///
/// # Privilege
///
/// Reading the `CPSR` is legal in every mode, but only privileged modes may
/// change the mask bits through [`disable_irqs`] and [`enable_irqs`].
#[inline]
#[must_use]
pub fn cpsr() -> u32 {
    arch::cpsr()
}

/// Whether IRQs are currently unmasked.
#[inline]
#[must_use]
pub fn irqs_enabled() -> bool {
    cpsr() & CPSR_IRQ_DISABLE == 0
}

/// Masks IRQs (`cpsid i`).
#[inline]
pub fn disable_irqs() {
    arch::mask();
}

/// Unmasks IRQs (`cpsie i`).
#[inline]
pub fn enable_irqs() {
    arch::unmask();
}

/// RAII guard that masks IRQs on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots `CPSR.I`. If IRQs were enabled it executes
/// `cpsid i`; on drop it executes `cpsie i` **only** if they were enabled
/// before, so nested guards leave the outer state untouched.
///
/// The guard is tied to the CPU state it saved and therefore not `Send`.
///
/// # Examples
///
/// ```no_run
/// use kernel_sync::irq::{IrqGuard, irqs_enabled};
///
/// {
///     let _g = IrqGuard::new();
///     assert!(!irqs_enabled());
/// }
/// ```
pub struct IrqGuard {
    /// Whether IRQs were unmasked when the guard was created.
    were_enabled: bool,
    _not_send: PhantomData<*const ()>,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = irqs_enabled();
        if enabled {
            disable_irqs();
        }
        Self {
            were_enabled: enabled,
            _not_send: PhantomData,
        }
    }

    /// Whether dropping this guard will unmask IRQs again.
    #[must_use]
    pub const fn restores(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable_irqs();
        }
    }
}
