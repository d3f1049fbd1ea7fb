//! Bring-up of the kernel's own address space.
//!
//! The kernel runs identity-mapped inside one environment. Its sections are
//! mapped up front; the system stack below [`memory::SYSTEM_STACK_TOP`] only
//! gets its top [`INITIAL_STACK_PAGES`] pages, and grows through data aborts
//! from there.

use kernel_info::memory;
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress};
use kernel_vmem::{HeapBounds, MapFlags, PhysMapper, TableAlloc};
use kernel_vmm::{EnvId, MmuRegisters, VmError, VmManager};

/// A 1 MiB section mapped onto itself.
#[derive(Debug, Copy, Clone)]
pub struct IdentitySection {
    pub base: u32,
    pub flags: MapFlags,
    pub name: &'static str,
}

/// Sections every kernel environment maps.
pub const IDENTITY_SECTIONS: [IdentitySection; 5] = [
    IdentitySection {
        base: 0x0000_0000,
        flags: MapFlags::KERNEL,
        name: "vectors and kernel image",
    },
    IdentitySection {
        base: 0x0010_0000,
        flags: MapFlags::KERNEL,
        name: "exception stacks and heap",
    },
    IdentitySection {
        base: 0x0020_0000,
        flags: MapFlags::KERNEL,
        name: "heap",
    },
    IdentitySection {
        base: memory::PERIPHERAL_BASE,
        flags: MapFlags::DEVICE,
        name: "peripherals",
    },
    IdentitySection {
        base: memory::GPIO_BASE,
        flags: MapFlags::DEVICE,
        name: "GPIO and mini UART",
    },
];

/// Stack pages mapped before the MMU goes on. Bring-up runs with the VM lock
/// held, so it must not fault on its own stack.
pub const INITIAL_STACK_PAGES: u32 = 4;

const _: () = {
    assert!(IDENTITY_SECTIONS[0].base <= memory::KERNEL_BASE);
    assert!(IDENTITY_SECTIONS[1].base <= memory::HEAP_START);
    assert!(IDENTITY_SECTIONS[2].base + memory::SECTION_SIZE == memory::HEAP_LIMIT);
    assert!(memory::SYSTEM_STACK_TOP - INITIAL_STACK_PAGES * 4096 >= memory::HEAP_LIMIT);
};

/// Allocates the kernel environment and maps its sections and initial stack.
///
/// # Errors
/// Propagates id exhaustion and table allocation failures.
pub fn map_kernel<R, A, M>(vm: &mut VmManager<R, A, M>) -> Result<EnvId, VmError>
where
    R: MmuRegisters,
    A: TableAlloc + HeapBounds,
    M: PhysMapper,
{
    let env = vm.allocate()?;

    for section in &IDENTITY_SECTIONS {
        log::debug!("identity-mapping {:#010x}: {}", section.base, section.name);
        vm.map_section(
            env,
            VirtualAddress::new(section.base),
            PhysicalAddress::new(section.base),
            section.flags,
        );
    }

    for page in 1..=INITIAL_STACK_PAGES {
        let va = VirtualAddress::new(memory::SYSTEM_STACK_TOP - page * 4096);
        debug_assert!(va.is_aligned::<Size4K>());
        vm.map_small_page(env, va, PhysicalAddress::new(va.as_u32()), MapFlags::KERNEL)?;
    }

    Ok(env)
}

/// [`map_kernel`], then installs the environment and enables the MMU.
///
/// # Errors
/// See [`map_kernel`].
///
/// # Panics
/// Panics if the MMU is already on.
pub fn bring_up<R, A, M>(vm: &mut VmManager<R, A, M>) -> Result<EnvId, VmError>
where
    R: MmuRegisters,
    A: TableAlloc + HeapBounds,
    M: PhysMapper,
{
    let env = map_kernel(vm)?;
    vm.switch_to(env);
    log::info!(
        "MMU on, environment {} active; heap {}..{}",
        env.slot(),
        vm.allocator().heap_start(),
        vm.allocator().heap_end()
    );
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmm::VmConfig;
    use kernel_vmm::mock::manager_with;

    const HEAP_BYTES: u32 = 256 * 1024;

    fn pa(v: u32) -> Option<PhysicalAddress> {
        Some(PhysicalAddress::new(v))
    }

    #[test]
    fn kernel_sections_are_identity_mapped() {
        let mut vm = manager_with(VmConfig::default(), HEAP_BYTES);
        let env = map_kernel(&mut vm).unwrap();

        for addr in [0x8000, 0x0012_0000, memory::HEAP_START, 0x002F_FFFC] {
            assert_eq!(vm.translate(env, VirtualAddress::new(addr)), pa(addr));
        }
        assert_eq!(
            vm.translate(env, VirtualAddress::new(memory::AUX_MU_IO_REG)),
            pa(memory::AUX_MU_IO_REG)
        );
        assert_eq!(
            vm.translate(env, VirtualAddress::new(memory::PERIPHERAL_BASE + 0xB21C)),
            pa(memory::IRQ_DISABLE_1)
        );
    }

    #[test]
    fn only_the_top_of_the_stack_is_mapped() {
        let mut vm = manager_with(VmConfig::default(), HEAP_BYTES);
        let env = map_kernel(&mut vm).unwrap();

        let lowest = memory::SYSTEM_STACK_TOP - INITIAL_STACK_PAGES * 4096;
        assert_eq!(vm.translate(env, VirtualAddress::new(lowest)), pa(lowest));
        assert_eq!(
            vm.translate(env, VirtualAddress::new(memory::SYSTEM_STACK_TOP - 4)),
            pa(memory::SYSTEM_STACK_TOP - 4)
        );
        assert_eq!(vm.translate(env, VirtualAddress::new(lowest - 4)), None);
        assert_eq!(vm.translate(env, VirtualAddress::new(memory::HEAP_LIMIT)), None);
        assert_eq!(vm.translate(env, VirtualAddress::new(memory::ARMBASE)), None);
    }

    #[test]
    fn bring_up_enables_the_mmu() {
        let mut vm = manager_with(VmConfig::default(), HEAP_BYTES);
        assert!(!vm.mmu_is_on());

        let env = bring_up(&mut vm).unwrap();
        assert!(vm.mmu_is_on());
        assert_eq!(vm.active().map(kernel_vmm::Environment::id), Some(env));
        assert_eq!(vm.mmu().registers().table_base.table(), vm.environment(env).root());
    }

    #[test]
    fn table_memory_comes_from_the_heap() {
        let mut vm = manager_with(VmConfig::default(), HEAP_BYTES);
        let before = vm.allocator().heap_end();
        map_kernel(&mut vm).unwrap();
        // root table plus one coarse table for the stack
        assert!(vm.allocator().heap_end().as_u32() - before.as_u32() >= 16 * 1024 + 1024);
    }

    #[test]
    fn out_of_table_memory_is_reported() {
        // room for the root table, not for the stack's coarse table
        let mut vm = manager_with(VmConfig::default(), 16 * 1024);
        assert!(matches!(map_kernel(&mut vm), Err(VmError::Map(_))));
    }
}
