//! Exception vectors.
//!
//! Each vector saves state on its mode's stack and calls an `extern "C"`
//! handler with the address of the faulting instruction. Only the data abort
//! handler returns: on a successful stack growth it re-executes the load or
//! store that faulted.

use kernel_sync::IrqLock;
use kernel_vmem::{HeapBounds, PhysMapper, TableAlloc};
use kernel_vmm::{FaultResolution, MmuRegisters, VmManager};

/// The exceptions the kernel has no handler for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    Reset,
    UndefinedInstruction,
    SoftwareInterrupt,
    PrefetchAbort,
    Interrupt,
    FastInterrupt,
}

impl Exception {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "reset vector",
            Self::UndefinedInstruction => "undefined instruction",
            Self::SoftwareInterrupt => "soft interrupt",
            Self::PrefetchAbort => "prefetch abort",
            Self::Interrupt => "general interrupt",
            Self::FastInterrupt => "fast",
        }
    }
}

/// # Panics
/// Always.
pub fn unhandled(exception: Exception, pc: u32) -> ! {
    panic!("unhandled exception <{}> at PC={pc:#x}", exception.name())
}

/// Runs the fault pipeline for a data abort at `pc` with `vm` locked.
///
/// # Panics
/// Panics if virtual memory is not set up yet, if the abort is fatal, or if
/// the abort was raised while `vm` was already locked.
pub fn service_data_abort<R, A, M>(
    vm: &IrqLock<Option<VmManager<R, A, M>>>,
    pc: u32,
) -> FaultResolution
where
    R: MmuRegisters,
    A: TableAlloc + HeapBounds,
    M: PhysMapper,
{
    let mut guard = vm.lock();
    let Some(vm) = guard.as_mut() else {
        panic!("data abort at PC={pc:#x} before virtual memory is initialized");
    };

    match vm.handle_data_abort(pc) {
        Ok(resolution) => resolution,
        Err(fatal) => panic!("fatal data abort: {fatal}"),
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::vectors::{KernelVm, VM, install_vectors};

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod vectors {
    use super::{Exception, service_data_abort, unhandled};
    use kernel_alloc::bump::BumpAllocator;
    use kernel_alloc::phys_mapper::IdentityPhysMapper;
    use kernel_info::memory;
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_sync::IrqLock;
    use kernel_vmm::{Cp15, VmManager};

    pub type KernelVm = VmManager<Cp15, BumpAllocator, IdentityPhysMapper>;

    /// The kernel's virtual-memory state, shared with the data abort handler.
    pub static VM: IrqLock<Option<KernelVm>> = IrqLock::new(None);

    core::arch::global_asm!(
        ".section .text.vectors, \"ax\"",
        ".balign 32",
        ".globl _interrupt_table",
        "_interrupt_table:",
        "    ldr pc, _reset_addr",
        "    ldr pc, _undefined_instruction_addr",
        "    ldr pc, _software_interrupt_addr",
        "    ldr pc, _prefetch_abort_addr",
        "    ldr pc, _data_abort_addr",
        "    ldr pc, _reset_addr",
        "    ldr pc, _interrupt_addr",
        "    ldr pc, _fast_interrupt_addr",
        "_reset_addr:                 .word reset_asm",
        "_undefined_instruction_addr: .word undefined_instruction_asm",
        "_software_interrupt_addr:    .word software_interrupt_asm",
        "_prefetch_abort_addr:        .word prefetch_abort_asm",
        "_data_abort_addr:            .word data_abort_asm",
        "_interrupt_addr:             .word interrupt_asm",
        "_fast_interrupt_addr:        .word fast_interrupt_asm",
        ".globl _interrupt_table_end",
        "_interrupt_table_end:",
        "",
        "reset_asm:",
        "    ldr sp, ={int_stack}",
        "    sub r0, lr, #4",
        "    bl reset_vector",
        "undefined_instruction_asm:",
        "    ldr sp, ={int_stack}",
        "    sub r0, lr, #4",
        "    bl undefined_instruction_vector",
        "software_interrupt_asm:",
        "    ldr sp, ={swi_stack}",
        "    sub r0, lr, #4",
        "    bl software_interrupt_vector",
        "prefetch_abort_asm:",
        "    ldr sp, ={int_stack}",
        "    sub r0, lr, #4",
        "    bl prefetch_abort_vector",
        "interrupt_asm:",
        "    ldr sp, ={int_stack}",
        "    sub r0, lr, #4",
        "    bl interrupt_vector",
        "fast_interrupt_asm:",
        "    ldr sp, ={int_stack}",
        "    sub r0, lr, #4",
        "    bl fast_interrupt_vector",
        // lr_abt points 8 past the faulting access; returning there retries it.
        "data_abort_asm:",
        "    ldr sp, ={int_stack}",
        "    sub lr, lr, #8",
        "    push {{r0-r12, lr}}",
        "    mov r0, lr",
        "    bl data_abort_vector",
        "    ldm sp!, {{r0-r12, pc}}^",
        "",
        ".globl install_vector_table",
        "install_vector_table:",
        "    ldr r0, =_interrupt_table",
        "    ldr r1, =_interrupt_table_end",
        "    mov r2, #0",
        "1:  cmp r0, r1",
        "    ldrlo r3, [r0], #4",
        "    strlo r3, [r2], #4",
        "    blo 1b",
        "    bx lr",
        ".ltorg",
        int_stack = const memory::INTERRUPT_STACK_TOP,
        swi_stack = const memory::SWI_STACK_TOP,
    );

    unsafe extern "C" {
        fn install_vector_table();
    }

    /// Masks every interrupt source and copies the vector table to address 0.
    pub fn install_vectors() {
        kernel_sync::irq::disable_irqs();
        unsafe {
            kernel_registers::mmio::write32(PhysicalAddress::new(memory::IRQ_DISABLE_1), u32::MAX);
            kernel_registers::mmio::write32(PhysicalAddress::new(memory::IRQ_DISABLE_2), u32::MAX);
            kernel_registers::cache::barrier();
            install_vector_table();
        }
    }

    #[unsafe(no_mangle)]
    extern "C" fn data_abort_vector(pc: u32) {
        let _ = service_data_abort(&VM, pc);
    }

    #[unsafe(no_mangle)]
    extern "C" fn reset_vector(pc: u32) -> ! {
        unhandled(Exception::Reset, pc)
    }

    #[unsafe(no_mangle)]
    extern "C" fn undefined_instruction_vector(pc: u32) -> ! {
        unhandled(Exception::UndefinedInstruction, pc)
    }

    #[unsafe(no_mangle)]
    extern "C" fn software_interrupt_vector(pc: u32) -> ! {
        unhandled(Exception::SoftwareInterrupt, pc)
    }

    #[unsafe(no_mangle)]
    extern "C" fn prefetch_abort_vector(pc: u32) -> ! {
        unhandled(Exception::PrefetchAbort, pc)
    }

    #[unsafe(no_mangle)]
    extern "C" fn interrupt_vector(pc: u32) -> ! {
        unhandled(Exception::Interrupt, pc)
    }

    #[unsafe(no_mangle)]
    extern "C" fn fast_interrupt_vector(pc: u32) -> ! {
        unhandled(Exception::FastInterrupt, pc)
    }
}
