//! # Environments
//!
//! An environment is one isolated address space: its own first-level table,
//! protection domain, ASID and process id. [`VmManager`] owns every piece of
//! state needed to create, switch and retire them.
//!
//! Ids come from three [`BitVector`]s (slots, domains, ASIDs). Domain 0 and
//! ASID 0 are reserved: domain 0 for the kernel, ASID 0 for the switch
//! sequence. Freeing an environment returns its ids but not its table
//! memory.

use crate::mmu::{Mmu, MmuRegisters};
use kernel_alloc::bitvec::{BitVector, BitVectorError};
use kernel_info::{memory, vm};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::context_id::ContextId;
use kernel_registers::dacr::{Domain, DomainAccess, DomainAccessControl};
use kernel_registers::ttbr0::TranslationTableBase;
use kernel_vmem::descriptor::{LargePageDescriptor, SectionDescriptor, SmallPageDescriptor};
use kernel_vmem::{AddressSpace, HeapBounds, MapError, MapFlags, PhysMapper, TableAlloc};

/// Runtime capacities. Defaults come from [`kernel_info::vm`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VmConfig {
    pub domains: usize,
    pub reserved_domains: usize,
    pub asids: usize,
    pub reserved_asids: usize,
    pub max_environments: usize,
    /// Upper bound (exclusive) of the stack-growth window.
    pub stack_top: VirtualAddress,
}

impl VmConfig {
    pub const DEFAULT: Self = Self {
        domains: vm::DOMAIN_CAPACITY,
        reserved_domains: vm::RESERVED_DOMAINS,
        asids: vm::ASID_CAPACITY,
        reserved_asids: vm::RESERVED_ASIDS,
        max_environments: vm::MAX_ENVIRONMENTS,
        stack_top: VirtualAddress::new(memory::MAX_STACK_ADDRESS),
    };
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Handle to an allocated environment (its slot number).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EnvId(usize);

impl EnvId {
    #[must_use]
    pub const fn slot(self) -> usize {
        self.0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Environment {
    id: EnvId,
    pid: u32,
    domain: Domain,
    asid: u8,
    domain_access: DomainAccessControl,
    root: PhysicalAddress,
}

impl Environment {
    #[must_use]
    pub const fn id(&self) -> EnvId {
        self.id
    }

    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub const fn domain(&self) -> Domain {
        self.domain
    }

    #[must_use]
    pub const fn asid(&self) -> u8 {
        self.asid
    }

    /// DACR value installed on switch. Defaults to client access on the
    /// environment's own domain and no access elsewhere.
    #[must_use]
    pub const fn domain_access(&self) -> DomainAccessControl {
        self.domain_access
    }

    /// Override the DACR value, e.g. to grant manager access. Takes effect on
    /// the next switch.
    pub const fn set_domain_access(&mut self, value: DomainAccessControl) {
        self.domain_access = value;
    }

    /// Physical address of the first-level table.
    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("no free environment slot: {0}")]
    NoEnvironmentSlot(#[source] BitVectorError),
    #[error("no free protection domain: {0}")]
    NoDomain(#[source] BitVectorError),
    #[error("no free ASID: {0}")]
    NoAsid(#[source] BitVectorError),
    #[error("process ids exhausted after pid {last}")]
    NoProcessId { last: u32 },
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Owner of all virtual-memory state.
pub struct VmManager<R: MmuRegisters, A: TableAlloc + HeapBounds, M: PhysMapper> {
    mmu: Mmu<R>,
    alloc: A,
    mapper: M,
    config: VmConfig,
    slots: BitVector,
    domains: BitVector,
    asids: BitVector,
    environments: [Option<Environment>; vm::MAX_ENVIRONMENTS],
    last_pid: u32,
    active: Option<EnvId>,
}

impl<R: MmuRegisters, A: TableAlloc + HeapBounds, M: PhysMapper> VmManager<R, A, M> {
    /// One-time setup: id allocators sized from `config`, MMU reset with the
    /// ARMv6 table format selected.
    ///
    /// # Panics
    /// Panics if `config` asks for more environments than
    /// [`vm::MAX_ENVIRONMENTS`] or more domains than the hardware has.
    pub fn init(registers: R, alloc: A, mapper: M, config: VmConfig) -> Self {
        assert!(
            config.max_environments <= vm::MAX_ENVIRONMENTS,
            "at most {} environments supported",
            vm::MAX_ENVIRONMENTS
        );
        assert!(config.domains <= vm::DOMAIN_CAPACITY, "at most 16 domains exist");
        assert!(
            config.asids <= vm::ASID_CAPACITY,
            "at most {} ASIDs supported",
            vm::ASID_CAPACITY
        );

        let mut mmu = Mmu::new(registers);
        mmu.init();
        log::info!(
            "vm: {} domains, {} asids, {} environments, stack top {}",
            config.domains,
            config.asids,
            config.max_environments,
            config.stack_top
        );
        Self {
            mmu,
            alloc,
            mapper,
            config,
            slots: BitVector::new(0, config.max_environments),
            domains: BitVector::new(config.reserved_domains, config.domains),
            asids: BitVector::new(config.reserved_asids, config.asids),
            environments: [None; vm::MAX_ENVIRONMENTS],
            last_pid: 0,
            active: None,
        }
    }

    /// Create an environment with an empty table and fresh ids.
    ///
    /// Nothing is consumed on failure, apart from table memory that was
    /// already handed out.
    ///
    /// # Errors
    /// The first exhausted resource: process id, slot, domain, ASID or table
    /// memory. Process ids are never reused, so running past the 24-bit
    /// CONTEXTIDR field is final.
    pub fn allocate(&mut self) -> Result<EnvId, VmError> {
        let pid = self
            .last_pid
            .checked_add(1)
            .filter(|&pid| pid <= ContextId::MAX_PROCESS_ID)
            .ok_or(VmError::NoProcessId { last: self.last_pid })?;
        let slot = self.slots.allocate().map_err(VmError::NoEnvironmentSlot)?;
        let domain = match self.domains.allocate() {
            Ok(domain) => domain,
            Err(e) => {
                release(&mut self.slots, slot, "slot");
                return Err(VmError::NoDomain(e));
            }
        };
        let asid = match self.asids.allocate() {
            Ok(asid) => asid,
            Err(e) => {
                release(&mut self.domains, domain, "domain");
                release(&mut self.slots, slot, "slot");
                return Err(VmError::NoAsid(e));
            }
        };
        let root = match AddressSpace::allocate_root(&self.mapper, &mut self.alloc) {
            Ok(space) => space.root(),
            Err(e) => {
                release(&mut self.asids, asid, "asid");
                release(&mut self.domains, domain, "domain");
                release(&mut self.slots, slot, "slot");
                return Err(e.into());
            }
        };

        self.last_pid = pid;
        let domain = Domain::new(domain as u8);
        let env = Environment {
            id: EnvId(slot),
            pid,
            domain,
            asid: asid as u8,
            domain_access: DomainAccessControl::only(domain, DomainAccess::Client),
            root,
        };
        log::info!(
            "env {slot}: pid {}, domain {domain}, asid {}, table {root}, dacr {:?}",
            env.pid,
            env.asid,
            env.domain_access
        );
        self.environments[slot] = Some(env);
        Ok(env.id)
    }

    /// Return the environment's ids. Its tables stay allocated.
    ///
    /// # Panics
    /// Panics if `id` is not allocated or is the active environment.
    pub fn free(&mut self, id: EnvId) {
        let env = *self.environment(id);
        assert_ne!(self.active, Some(id), "cannot free the active environment {id:?}");

        release(&mut self.asids, usize::from(env.asid), "asid");
        release(&mut self.domains, usize::from(env.domain.id()), "domain");
        release(&mut self.slots, id.0, "slot");
        self.environments[id.0] = None;
        log::info!(
            "env {}: freed pid {} (table {} not reclaimed)",
            id.0,
            env.pid,
            env.root
        );
    }

    /// Install `id`'s address space and turn the MMU on.
    ///
    /// # Panics
    /// Panics if `id` is not allocated or the MMU is already on.
    pub fn switch_to(&mut self, id: EnvId) {
        let env = *self.environment(id);
        assert!(!self.mmu.is_on(), "switch_to requires the MMU to be off");

        self.mmu.install(
            env.domain_access,
            TranslationTableBase::from_table(env.root),
            ContextId::for_process(env.pid, env.asid),
        );

        let installed = self.mmu.registers().context_id();
        log::debug!(
            "env {}: pid={} (expect {}), asid={} (expect {})",
            id.0,
            installed.process_id(),
            env.pid,
            installed.asid(),
            env.asid
        );
        debug_assert_eq!(installed.process_id(), env.pid, "process id readback");
        debug_assert_eq!(installed.asid(), env.asid, "asid readback");

        self.active = Some(id);
        self.mmu.enable();
    }

    #[must_use]
    pub fn mmu_is_on(&self) -> bool {
        self.mmu.is_on()
    }

    /// # Panics
    /// Panics if the MMU is already on.
    pub fn mmu_enable(&mut self) {
        self.mmu.enable();
    }

    /// Turns the MMU off; no environment is active afterwards.
    ///
    /// # Panics
    /// Panics if the MMU is already off.
    pub fn mmu_disable(&mut self) {
        self.mmu.disable();
        self.active = None;
    }

    pub fn caches_on(&mut self) {
        self.mmu.caches_on();
    }

    pub fn caches_off(&mut self) {
        self.mmu.caches_off();
    }

    /// # Panics
    /// Panics if `id` is not allocated.
    #[must_use]
    pub fn environment(&self, id: EnvId) -> &Environment {
        match self.environments.get(id.0) {
            Some(Some(env)) => env,
            _ => panic!("environment {id:?} is not allocated"),
        }
    }

    /// # Panics
    /// Panics if `id` is not allocated.
    pub fn environment_mut(&mut self, id: EnvId) -> &mut Environment {
        match self.environments.get_mut(id.0) {
            Some(Some(env)) => env,
            _ => panic!("environment {id:?} is not allocated"),
        }
    }

    /// The environment installed by the last [`switch_to`](Self::switch_to),
    /// while the MMU is on.
    #[must_use]
    pub fn active(&self) -> Option<&Environment> {
        self.active.map(|id| self.environment(id))
    }

    /// View `id`'s translation tree.
    #[must_use]
    pub fn address_space(&self, id: EnvId) -> AddressSpace<'_, M> {
        AddressSpace::from_root(&self.mapper, self.environment(id).root)
    }

    /// Map a section in `id` under its own domain.
    ///
    /// # Panics
    /// See [`AddressSpace::map_section`].
    pub fn map_section(
        &mut self,
        id: EnvId,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: MapFlags,
    ) -> SectionDescriptor {
        let env = *self.environment(id);
        AddressSpace::from_root(&self.mapper, env.root).map_section(va, pa, env.domain, flags)
    }

    /// Map a small page in `id` under its own domain.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a coarse table cannot be allocated.
    ///
    /// # Panics
    /// See [`AddressSpace::map_small_page`].
    pub fn map_small_page(
        &mut self,
        id: EnvId,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: MapFlags,
    ) -> Result<SmallPageDescriptor, MapError> {
        let env = *self.environment(id);
        AddressSpace::from_root(&self.mapper, env.root).map_small_page(
            &mut self.alloc,
            va,
            pa,
            env.domain,
            flags,
        )
    }

    /// Map a large page in `id` under its own domain.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a coarse table cannot be allocated.
    ///
    /// # Panics
    /// See [`AddressSpace::map_large_page`].
    pub fn map_large_page(
        &mut self,
        id: EnvId,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: MapFlags,
    ) -> Result<LargePageDescriptor, MapError> {
        let env = *self.environment(id);
        AddressSpace::from_root(&self.mapper, env.root).map_large_page(
            &mut self.alloc,
            va,
            pa,
            env.domain,
            flags,
        )
    }

    #[must_use]
    pub fn translate(&self, id: EnvId, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.address_space(id).translate(va)
    }

    #[must_use]
    pub const fn config(&self) -> &VmConfig {
        &self.config
    }

    #[must_use]
    pub const fn allocator(&self) -> &A {
        &self.alloc
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Raw MMU access. Changing the translation state through it leaves the
    /// manager's view of the active environment stale.
    pub const fn mmu_mut(&mut self) -> &mut Mmu<R> {
        &mut self.mmu
    }

    #[must_use]
    pub const fn mmu(&self) -> &Mmu<R> {
        &self.mmu
    }
}

fn release(ids: &mut BitVector, id: usize, what: &str) {
    if let Err(e) = ids.free(id) {
        panic!("environment {what} bookkeeping corrupted: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Op, TestManager, manager_with};

    fn manager() -> TestManager {
        manager_with(VmConfig::DEFAULT, 256 * 1024)
    }

    #[test]
    fn init_sets_xp_and_leaves_mmu_off() {
        let vm = manager();
        assert!(vm.mmu().registers().control.xp_extended_page_tables());
        assert!(!vm.mmu_is_on());
        assert!(vm.active().is_none());
    }

    #[test]
    fn environments_get_distinct_ids_and_tables() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        let b = vm.allocate().unwrap();
        let (ea, eb) = (*vm.environment(a), *vm.environment(b));

        assert_eq!((ea.pid(), eb.pid()), (1, 2));
        assert_eq!((ea.domain(), eb.domain()), (Domain::new(1), Domain::new(2)));
        assert_eq!((ea.asid(), eb.asid()), (1, 2));
        assert_ne!(ea.root(), eb.root());
        assert_eq!(ea.root().as_u32() % (16 * 1024), 0);
        assert_eq!(ea.domain_access().into_bits(), 0b01 << 2);
        assert_eq!(eb.domain_access().into_bits(), 0b01 << 4);
    }

    #[test]
    fn same_va_in_two_environments_stays_separate() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        let b = vm.allocate().unwrap();
        let va = VirtualAddress::new(0x0050_0000);
        vm.map_small_page(a, va, PhysicalAddress::new(0x0060_0000), MapFlags::new()).unwrap();
        vm.map_small_page(b, va, PhysicalAddress::new(0x0070_0000), MapFlags::new()).unwrap();
        vm.map_section(
            a,
            VirtualAddress::new(0x0080_0000),
            PhysicalAddress::new(0x0080_0000),
            MapFlags::KERNEL,
        );

        assert_eq!(vm.translate(a, va), Some(PhysicalAddress::new(0x0060_0000)));
        assert_eq!(vm.translate(b, va), Some(PhysicalAddress::new(0x0070_0000)));
        assert_eq!(vm.translate(b, VirtualAddress::new(0x0080_0000)), None);
        // the coarse table inherits the owning environment's domain
        let fld = vm.address_space(b).lookup_first_level(va);
        let own = vm.environment(b).domain();
        assert!(matches!(
            fld.kind(),
            kernel_vmem::descriptor::FirstLevelKind::Coarse(c) if c.domain() == own
        ));
    }

    #[test]
    fn pids_keep_increasing_after_free() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        vm.free(a);
        let b = vm.allocate().unwrap();
        assert_eq!(b, a, "slot is reused");
        assert_eq!(vm.environment(b).pid(), 2);
        assert_eq!(vm.environment(b).domain(), Domain::new(1));
    }

    #[test]
    fn free_does_not_reclaim_tables() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        let end = vm.allocator().heap_end();
        vm.free(a);
        assert_eq!(vm.allocator().heap_end(), end);
        let b = vm.allocate().unwrap();
        assert_ne!(vm.environment(b).root().as_u32(), end.as_u32() - 16 * 1024);
        assert!(vm.allocator().heap_end() > end);
    }

    #[test]
    fn slot_exhaustion_rolls_back() {
        let config = VmConfig { max_environments: 2, ..VmConfig::DEFAULT };
        let mut vm = manager_with(config, 256 * 1024);
        vm.allocate().unwrap();
        vm.allocate().unwrap();
        assert!(matches!(vm.allocate(), Err(VmError::NoEnvironmentSlot(_))));
    }

    #[test]
    fn domain_exhaustion_rolls_back_slot() {
        let config = VmConfig { domains: 2, ..VmConfig::DEFAULT };
        let mut vm = manager_with(config, 256 * 1024);
        vm.allocate().unwrap();
        assert!(matches!(vm.allocate(), Err(VmError::NoDomain(_))));
        assert!(matches!(vm.allocate(), Err(VmError::NoDomain(_))));
        assert_eq!(vm.slots.allocated_count(), 1);
    }

    #[test]
    fn asid_exhaustion_rolls_back_domain() {
        let config = VmConfig { asids: 2, ..VmConfig::DEFAULT };
        let mut vm = manager_with(config, 256 * 1024);
        vm.allocate().unwrap();
        assert!(matches!(vm.allocate(), Err(VmError::NoAsid(_))));
        assert_eq!(vm.domains.allocated_count(), 2);
        assert_eq!(vm.slots.allocated_count(), 1);
    }

    #[test]
    fn failed_allocation_returns_taken_domain() {
        let config = VmConfig { asids: 2, ..VmConfig::DEFAULT };
        let mut vm = manager_with(config, 256 * 1024);
        let a = vm.allocate().unwrap();
        assert!(vm.domains.is_allocated(1));

        // domain 2 is handed out, then the ASID allocation fails
        assert!(matches!(vm.allocate(), Err(VmError::NoAsid(_))));
        assert!(!vm.domains.is_allocated(2));
        assert!(!vm.slots.is_allocated(1));

        vm.free(a);
        let b = vm.allocate().unwrap();
        assert_eq!(vm.environment(b).domain(), Domain::new(1));
        assert_eq!(vm.environment(b).asid(), 1);
    }

    #[test]
    fn failed_root_allocation_returns_every_id() {
        let mut vm = manager_with(VmConfig::DEFAULT, 16 * 1024);
        vm.allocate().unwrap();
        assert!(matches!(vm.allocate(), Err(VmError::Map(_))));
        assert!(!vm.slots.is_allocated(1));
        assert!(!vm.domains.is_allocated(2));
        assert!(!vm.asids.is_allocated(2));
    }

    #[test]
    fn pids_stop_at_context_id_field_width() {
        let mut vm = manager();
        vm.last_pid = ContextId::MAX_PROCESS_ID - 1;
        let a = vm.allocate().unwrap();
        assert_eq!(vm.environment(a).pid(), ContextId::MAX_PROCESS_ID);
        assert_eq!(
            vm.allocate(),
            Err(VmError::NoProcessId {
                last: ContextId::MAX_PROCESS_ID
            })
        );
        // nothing was taken by the refused allocation
        assert_eq!(vm.slots.allocated_count(), 1);
        assert!(!vm.domains.is_allocated(2));

        vm.switch_to(a);
        assert_eq!(
            vm.mmu().registers().context_id.process_id(),
            ContextId::MAX_PROCESS_ID
        );
    }

    #[test]
    fn table_exhaustion_is_reported() {
        let mut vm = manager_with(VmConfig::DEFAULT, 16 * 1024);
        vm.allocate().unwrap();
        assert_eq!(
            vm.allocate(),
            Err(VmError::Map(MapError::OutOfMemory {
                what: "first-level table",
                bytes: 16 * 1024
            }))
        );
        assert_eq!(vm.asids.allocated_count(), 2);
    }

    #[test]
    fn switch_installs_registers_and_enables() {
        let mut vm = manager();
        let _ = vm.allocate().unwrap();
        let b = vm.allocate().unwrap();
        vm.mmu_mut().registers_mut().ops.clear();
        vm.switch_to(b);

        let env = *vm.environment(b);
        let regs = vm.mmu().registers();
        assert_eq!(regs.domain_access, env.domain_access());
        assert_eq!(regs.table_base.table(), env.root());
        assert_eq!(regs.context_id, ContextId::for_process(env.pid(), env.asid()));
        assert_eq!(regs.ops[0], Op::SetDomainAccess(env.domain_access()));
        assert!(vm.mmu_is_on());
        assert_eq!(vm.active().map(Environment::id), Some(b));
    }

    #[test]
    fn domain_access_override_applies_on_switch() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        let manager_access =
            DomainAccessControl::only(vm.environment(a).domain(), DomainAccess::Manager);
        vm.environment_mut(a).set_domain_access(manager_access);
        vm.switch_to(a);
        assert_eq!(vm.mmu().registers().domain_access, manager_access);
    }

    #[test]
    #[should_panic(expected = "requires the MMU to be off")]
    fn switch_with_mmu_on_panics() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        vm.switch_to(a);
        vm.switch_to(a);
    }

    #[test]
    fn disable_allows_switching_again() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        let b = vm.allocate().unwrap();
        vm.switch_to(a);
        vm.mmu_disable();
        assert!(vm.active().is_none());
        vm.free(a);
        vm.switch_to(b);
        assert_eq!(vm.active().map(Environment::pid), Some(2));
    }

    #[test]
    #[should_panic(expected = "cannot free the active environment")]
    fn freeing_active_environment_panics() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        vm.switch_to(a);
        vm.free(a);
    }

    #[test]
    #[should_panic(expected = "is not allocated")]
    fn double_free_panics() {
        let mut vm = manager();
        let a = vm.allocate().unwrap();
        vm.free(a);
        vm.free(a);
    }
}
