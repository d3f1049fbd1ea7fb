//! # Memory Layout
//!
//! Identity-mapped layout of the low 4 MiB on the Raspberry Pi (ARM1176JZF-S).
//!
//! ```text
//! 0x0040_8000  ARMBASE, first user program
//! 0x0040_0000  USER_SPACE_START / SYSTEM_STACK_TOP (system stack grows down)
//!      ...     stack growth window, demand-mapped in 4 KiB pages
//! 0x0030_0000  HEAP_LIMIT
//! 0x0014_0000  HEAP_START (bump heap grows up)
//! 0x0013_0000  INTERRUPT_STACK_TOP (64 KiB)
//! 0x0012_0000  SWI_STACK_TOP (64 KiB)
//! 0x0000_8000  KERNEL_BASE, kernel image
//! 0x0000_0000  exception vectors
//! ```

/// Granule of a first-level section mapping.
pub const SECTION_SIZE: u32 = 0x0010_0000;

/// Where the kernel image is linked and loaded.
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const KERNEL_BASE: u32 = 0x8000;

/// Where user programs are linked.
pub const ARMBASE: u32 = 0x0040_8000;

/// Top of the supervisor-call stack (grows down).
pub const SWI_STACK_TOP: u32 = 0x0012_0000;

/// Top of the interrupt stack (grows down).
pub const INTERRUPT_STACK_TOP: u32 = 0x0013_0000;

/// Top of the system stack (grows down towards the heap).
pub const SYSTEM_STACK_TOP: u32 = 0x0040_0000;

/// Start of the bump heap that also provides page-table storage.
pub const HEAP_START: u32 = 0x0014_0000;

/// First address of user space.
pub const USER_SPACE_START: u32 = 0x0040_0000;

/// End of the heap. Page tables are edited with the MMU on, so everything the
/// heap hands out must lie inside the identity-mapped heap sections.
pub const HEAP_LIMIT: u32 = 0x0030_0000;

/// Upper bound of the stack-growth window used by the data-abort handler.
pub const MAX_STACK_ADDRESS: u32 = SYSTEM_STACK_TOP;

/// BCM2835 peripheral window as seen by the ARM core.
pub const PERIPHERAL_BASE: u32 = 0x2000_0000;

/// Section holding the GPIO block and the auxiliary (mini UART) peripherals.
pub const GPIO_BASE: u32 = 0x2020_0000;

/// Interrupt controller: writing ones masks the corresponding IRQ sources 0..32.
pub const IRQ_DISABLE_1: u32 = 0x2000_B21C;

/// Interrupt controller: writing ones masks IRQ sources 32..64.
pub const IRQ_DISABLE_2: u32 = 0x2000_B220;

/// Mini UART I/O data register.
pub const AUX_MU_IO_REG: u32 = 0x2021_5040;

/// Mini UART line status register.
pub const AUX_MU_LSR_REG: u32 = 0x2021_5054;

const _: () = {
    assert!(SWI_STACK_TOP < INTERRUPT_STACK_TOP);
    assert!(INTERRUPT_STACK_TOP < HEAP_START);
    assert!(HEAP_START < HEAP_LIMIT);
    assert!(HEAP_LIMIT <= SYSTEM_STACK_TOP);
    assert!(HEAP_LIMIT.is_multiple_of(SECTION_SIZE));
    assert!(SYSTEM_STACK_TOP <= USER_SPACE_START);
    assert!(USER_SPACE_START < ARMBASE);
    assert!(PERIPHERAL_BASE.is_multiple_of(SECTION_SIZE));
    assert!(GPIO_BASE.is_multiple_of(SECTION_SIZE));
    assert!(AUX_MU_IO_REG & !(SECTION_SIZE - 1) == GPIO_BASE);
};
