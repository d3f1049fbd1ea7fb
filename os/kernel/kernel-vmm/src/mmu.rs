//! # MMU Control
//!
//! [`MmuRegisters`] is the seam between the virtual-memory logic and CP15:
//! the kernel plugs in [`Cp15`], tests plug in a recording mock. [`Mmu`]
//! implements the enable/disable/cache sequences on top of it.

use kernel_registers::context_id::ContextId;
use kernel_registers::dacr::DomainAccessControl;
use kernel_registers::dfsr::DataFaultStatus;
use kernel_registers::far::FaultAddress;
use kernel_registers::sctlr::SystemControl;
use kernel_registers::ttbr0::TranslationTableBase;

/// Access to the CP15 state the virtual-memory code reads and writes.
///
/// Implementations are only constructible where the access is legal (e.g.
/// privileged mode), so the methods themselves are safe.
pub trait MmuRegisters {
    fn control(&self) -> SystemControl;
    fn set_control(&mut self, value: SystemControl);

    fn domain_access(&self) -> DomainAccessControl;
    fn set_domain_access(&mut self, value: DomainAccessControl);

    fn table_base(&self) -> TranslationTableBase;
    fn set_table_base(&mut self, value: TranslationTableBase);

    fn context_id(&self) -> ContextId;
    fn set_context_id(&mut self, value: ContextId);

    fn fault_status(&self) -> DataFaultStatus;
    fn fault_address(&self) -> FaultAddress;

    /// Data synchronization barrier followed by a prefetch flush.
    fn barrier(&mut self);
    fn invalidate_tlb(&mut self);
    fn clean_invalidate_dcache(&mut self);
    fn invalidate_icache(&mut self);
    fn flush_branch_targets(&mut self);
}

/// The real coprocessor.
#[cfg(all(feature = "asm", target_arch = "arm"))]
pub struct Cp15 {
    _private: (),
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl Cp15 {
    /// # Safety
    /// The returned handle must only be used in a privileged processor mode.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl MmuRegisters for Cp15 {
    fn control(&self) -> SystemControl {
        unsafe { kernel_registers::LoadRegisterUnsafe::load_unsafe() }
    }

    fn set_control(&mut self, value: SystemControl) {
        unsafe { kernel_registers::StoreRegisterUnsafe::store_unsafe(value) }
    }

    fn domain_access(&self) -> DomainAccessControl {
        unsafe { kernel_registers::LoadRegisterUnsafe::load_unsafe() }
    }

    fn set_domain_access(&mut self, value: DomainAccessControl) {
        unsafe { kernel_registers::StoreRegisterUnsafe::store_unsafe(value) }
    }

    fn table_base(&self) -> TranslationTableBase {
        unsafe { kernel_registers::LoadRegisterUnsafe::load_unsafe() }
    }

    fn set_table_base(&mut self, value: TranslationTableBase) {
        unsafe { kernel_registers::StoreRegisterUnsafe::store_unsafe(value) }
    }

    fn context_id(&self) -> ContextId {
        unsafe { kernel_registers::LoadRegisterUnsafe::load_unsafe() }
    }

    fn set_context_id(&mut self, value: ContextId) {
        unsafe { kernel_registers::StoreRegisterUnsafe::store_unsafe(value) }
    }

    fn fault_status(&self) -> DataFaultStatus {
        unsafe { kernel_registers::LoadRegisterUnsafe::load_unsafe() }
    }

    fn fault_address(&self) -> FaultAddress {
        unsafe { kernel_registers::LoadRegisterUnsafe::load_unsafe() }
    }

    fn barrier(&mut self) {
        unsafe { kernel_registers::cache::barrier() }
    }

    fn invalidate_tlb(&mut self) {
        unsafe { kernel_registers::cache::invalidate_tlb() }
    }

    fn clean_invalidate_dcache(&mut self) {
        unsafe { kernel_registers::cache::clean_invalidate_dcache() }
    }

    fn invalidate_icache(&mut self) {
        unsafe { kernel_registers::cache::invalidate_icache() }
    }

    fn flush_branch_targets(&mut self) {
        unsafe { kernel_registers::cache::flush_branch_targets() }
    }
}

/// MMU state machine over a register port.
pub struct Mmu<R: MmuRegisters> {
    regs: R,
}

impl<R: MmuRegisters> Mmu<R> {
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    #[must_use]
    pub const fn registers(&self) -> &R {
        &self.regs
    }

    pub const fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Invalidate caches, TLB and branch predictor, then select the ARMv6
    /// page-table format (`XP = 1`).
    pub fn init(&mut self) {
        self.reset();
        let ctrl = self.regs.control().with_xp_extended_page_tables(true);
        self.regs.set_control(ctrl);
        self.regs.barrier();
        log::info!("mmu initialized, control {:#010x}", ctrl.into_bits());
    }

    fn reset(&mut self) {
        self.regs.clean_invalidate_dcache();
        self.regs.invalidate_icache();
        self.regs.flush_branch_targets();
        self.regs.invalidate_tlb();
        self.regs.barrier();
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.regs.control().m_mmu_enable()
    }

    /// # Panics
    /// Panics if the MMU is already on.
    pub fn enable(&mut self) {
        let ctrl = self.regs.control();
        assert!(!ctrl.m_mmu_enable(), "mmu_enable: MMU is already on");
        self.regs.invalidate_tlb();
        self.regs.barrier();
        self.regs.set_control(ctrl.with_m_mmu_enable(true));
        self.regs.barrier();
        log::info!("mmu on");
    }

    /// Turn translation and the data cache off, then clean and invalidate so
    /// nothing stale survives into the next translation regime.
    ///
    /// # Panics
    /// Panics if the MMU is already off.
    pub fn disable(&mut self) {
        let ctrl = self.regs.control();
        assert!(ctrl.m_mmu_enable(), "mmu_disable: MMU is already off");
        self.regs.set_control(ctrl.with_m_mmu_enable(false).with_c_dcache_enable(false));
        self.regs.barrier();
        self.regs.clean_invalidate_dcache();
        self.regs.invalidate_icache();
        self.regs.invalidate_tlb();
        self.regs.barrier();
        log::info!("mmu off");
    }

    /// Data and instruction caches, write buffer, branch prediction, L2.
    pub fn caches_on(&mut self) {
        let ctrl = self.regs.control().with_all_caches(true);
        self.regs.set_control(ctrl);
        self.regs.barrier();
        log::debug!("caches on");
    }

    pub fn caches_off(&mut self) {
        let ctrl = self.regs.control().with_all_caches(false);
        self.regs.set_control(ctrl);
        self.regs.barrier();
        self.regs.clean_invalidate_dcache();
        self.regs.invalidate_icache();
        self.regs.barrier();
        log::debug!("caches off");
    }

    /// Install a new address space.
    ///
    /// The context id is parked on the reserved ASID while TTBR0 changes, so
    /// no TLB fill can pair the new ASID with the old table.
    pub fn install(
        &mut self,
        dacr: DomainAccessControl,
        ttbr: TranslationTableBase,
        context: ContextId,
    ) {
        self.regs.set_domain_access(dacr);
        self.regs.set_context_id(ContextId::RESERVED);
        self.regs.barrier();
        self.regs.set_table_base(ttbr);
        self.regs.barrier();
        self.regs.set_context_id(context);
        self.regs.barrier();
    }

    /// Make table writes visible to the hardware walker.
    pub fn sync_tables(&mut self) {
        self.regs.clean_invalidate_dcache();
        self.regs.barrier();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCp15, Op};
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_registers::dacr::{Domain, DomainAccess};

    #[test]
    fn init_selects_extended_page_tables() {
        let mut mmu = Mmu::new(MockCp15::default());
        mmu.init();
        assert!(mmu.registers().control.xp_extended_page_tables());
        assert!(!mmu.is_on());
        assert!(mmu.registers().ops.contains(&Op::InvalidateTlb));
    }

    #[test]
    fn enable_then_disable() {
        let mut mmu = Mmu::new(MockCp15::default());
        mmu.caches_on();
        mmu.enable();
        assert!(mmu.is_on());
        mmu.disable();
        assert!(!mmu.is_on());
        assert!(!mmu.registers().control.c_dcache_enable());
        assert!(mmu.registers().control.i_icache_enable());
    }

    #[test]
    #[should_panic(expected = "already on")]
    fn double_enable_panics() {
        let mut mmu = Mmu::new(MockCp15::default());
        mmu.enable();
        mmu.enable();
    }

    #[test]
    #[should_panic(expected = "already off")]
    fn disable_while_off_panics() {
        Mmu::new(MockCp15::default()).disable();
    }

    #[test]
    fn caches_toggle_all_units() {
        let mut mmu = Mmu::new(MockCp15::default());
        mmu.caches_on();
        let c = mmu.registers().control;
        assert!(c.c_dcache_enable() && c.i_icache_enable() && c.w_write_buffer());
        assert!(c.z_branch_prediction() && c.l2_cache_enable());
        mmu.caches_off();
        let c = mmu.registers().control;
        assert!(!c.c_dcache_enable() && !c.i_icache_enable() && !c.z_branch_prediction());
        assert_eq!(mmu.registers().ops.last(), Some(&Op::Barrier));
    }

    #[test]
    fn install_parks_reserved_asid_around_ttbr_write() {
        let mut mmu = Mmu::new(MockCp15::default());
        let dacr = DomainAccessControl::only(Domain::new(2), DomainAccess::Client);
        let ttbr = TranslationTableBase::from_table(PhysicalAddress::new(0x0014_4000));
        let ctx = ContextId::for_process(3, 7);
        mmu.install(dacr, ttbr, ctx);

        assert_eq!(
            mmu.registers().ops,
            [
                Op::SetDomainAccess(dacr),
                Op::SetContextId(ContextId::RESERVED),
                Op::Barrier,
                Op::SetTableBase(ttbr),
                Op::Barrier,
                Op::SetContextId(ctx),
                Op::Barrier,
            ]
        );
    }
}
