//! Recording stand-in for CP15, for host tests of code built on [`VmManager`].

use crate::environment::{VmConfig, VmManager};
use crate::mmu::MmuRegisters;
use alloc::vec::Vec;
use kernel_alloc::bump::BumpAllocator;
use kernel_info::memory;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::context_id::ContextId;
use kernel_registers::dacr::DomainAccessControl;
use kernel_registers::dfsr::DataFaultStatus;
use kernel_registers::far::FaultAddress;
use kernel_registers::sctlr::SystemControl;
use kernel_registers::ttbr0::TranslationTableBase;
use kernel_vmem::sim::SimulatedRam;

pub type TestManager = VmManager<MockCp15, BumpAllocator, SimulatedRam>;

/// A manager whose heap (and table memory) is `heap_bytes` of simulated RAM
/// starting at [`memory::HEAP_START`].
#[must_use]
pub fn manager_with(config: VmConfig, heap_bytes: u32) -> TestManager {
    let ram = SimulatedRam::new(PhysicalAddress::new(memory::HEAP_START), heap_bytes);
    let heap = BumpAllocator::new(ram.base(), ram.end());
    VmManager::init(MockCp15::default(), heap, ram, config)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Op {
    SetControl(SystemControl),
    SetDomainAccess(DomainAccessControl),
    SetTableBase(TranslationTableBase),
    SetContextId(ContextId),
    Barrier,
    InvalidateTlb,
    CleanInvalidateDcache,
    InvalidateIcache,
    FlushBranchTargets,
}

#[derive(Debug, Default)]
pub struct MockCp15 {
    pub control: SystemControl,
    pub domain_access: DomainAccessControl,
    pub table_base: TranslationTableBase,
    pub context_id: ContextId,
    pub fault_status: DataFaultStatus,
    pub fault_address: FaultAddress,
    pub ops: Vec<Op>,
}

impl MockCp15 {
    /// Latch a data abort as the hardware would before trapping.
    pub fn raise_abort(&mut self, status: u8, domain: u8, write: bool, address: u32) {
        self.fault_status = DataFaultStatus::from_parts(status, domain, write);
        self.fault_address = FaultAddress(VirtualAddress::new(address));
    }
}

impl MmuRegisters for MockCp15 {
    fn control(&self) -> SystemControl {
        self.control
    }

    fn set_control(&mut self, value: SystemControl) {
        self.control = value;
        self.ops.push(Op::SetControl(value));
    }

    fn domain_access(&self) -> DomainAccessControl {
        self.domain_access
    }

    fn set_domain_access(&mut self, value: DomainAccessControl) {
        self.domain_access = value;
        self.ops.push(Op::SetDomainAccess(value));
    }

    fn table_base(&self) -> TranslationTableBase {
        self.table_base
    }

    fn set_table_base(&mut self, value: TranslationTableBase) {
        self.table_base = value;
        self.ops.push(Op::SetTableBase(value));
    }

    fn context_id(&self) -> ContextId {
        self.context_id
    }

    fn set_context_id(&mut self, value: ContextId) {
        self.context_id = value;
        self.ops.push(Op::SetContextId(value));
    }

    fn fault_status(&self) -> DataFaultStatus {
        self.fault_status
    }

    fn fault_address(&self) -> FaultAddress {
        self.fault_address
    }

    fn barrier(&mut self) {
        self.ops.push(Op::Barrier);
    }

    fn invalidate_tlb(&mut self) {
        self.ops.push(Op::InvalidateTlb);
    }

    fn clean_invalidate_dcache(&mut self) {
        self.ops.push(Op::CleanInvalidateDcache);
    }

    fn invalidate_icache(&mut self) {
        self.ops.push(Op::InvalidateIcache);
    }

    fn flush_branch_targets(&mut self) {
        self.ops.push(Op::FlushBranchTargets);
    }
}
