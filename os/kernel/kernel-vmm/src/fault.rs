//! # Data-Abort Pipeline
//!
//! Decodes DFSR/FAR into a [`DataAbort`], classifies it against the heap and
//! the stack-growth window, and either demand-maps a stack page or reports a
//! [`FatalFault`].
//!
//! ```text
//!   FAR untrusted ───────────────────────────► fatal
//!   FAR == 0 ────────────────────────────────► fatal (null)
//!   heap_end < FAR < stack_top ──────────────► map page, resume
//!   heap_start <= FAR <= heap_end ───────────► fatal (heap)
//!   anything else ───────────────────────────► fatal (out of range)
//! ```

use crate::environment::VmManager;
use crate::mmu::MmuRegisters;
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress};
use kernel_registers::dacr::Domain;
use kernel_registers::dfsr::DataFaultStatus;
use kernel_registers::far::FaultAddress;
use kernel_vmem::descriptor::{FirstLevelKind, SmallPageDescriptor};
use kernel_vmem::{HeapBounds, MapError, MapFlags, PhysMapper, TableAlloc};

/// The combined 5-bit fault status `FS[4:0]`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FaultStatus(u8);

impl FaultStatus {
    pub const PMSA_TLB_MISS: Self = Self(0b00000);
    pub const ALIGNMENT: Self = Self(0b00001);
    pub const DEBUG_EVENT: Self = Self(0b00010);
    pub const ICACHE_MAINTENANCE: Self = Self(0b00100);
    pub const SECTION_TRANSLATION: Self = Self(0b00101);
    pub const PAGE_TRANSLATION: Self = Self(0b00111);
    pub const PRECISE_EXTERNAL: Self = Self(0b01000);
    pub const SECTION_DOMAIN: Self = Self(0b01001);
    pub const PAGE_DOMAIN: Self = Self(0b01011);
    pub const L1_EXTERNAL_TRANSLATION: Self = Self(0b01100);
    pub const SECTION_PERMISSION: Self = Self(0b01101);
    pub const L2_EXTERNAL_TRANSLATION: Self = Self(0b01110);
    pub const PAGE_PERMISSION: Self = Self(0b01111);
    pub const TLB_LOCK: Self = Self(0b10100);
    pub const IMPRECISE_EXTERNAL: Self = Self(0b10110);
    pub const PARITY_ERROR: Self = Self(0b11000);
    pub const COPROCESSOR_ABORT: Self = Self(0b11010);

    #[must_use]
    pub const fn new(bits: u8) -> Self {
        Self(bits & 0x1F)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ALIGNMENT => "Alignment issue",
            Self::PMSA_TLB_MISS => "PMSA - TLB miss (MPU)",
            Self::ICACHE_MAINTENANCE => "Instruction cache maintenance operation fault",
            Self::L1_EXTERNAL_TRANSLATION => "1st level external abort on translation",
            Self::L2_EXTERNAL_TRANSLATION => "2nd level external abort on translation",
            Self::SECTION_TRANSLATION => "Section translation",
            Self::PAGE_TRANSLATION => "Page translation",
            Self::SECTION_DOMAIN => "Section domain fault",
            Self::PAGE_DOMAIN => "Page domain fault",
            Self::SECTION_PERMISSION => "Section permission fault",
            Self::PAGE_PERMISSION => "Page permission fault",
            Self::PRECISE_EXTERNAL => "Precise external abort",
            Self::TLB_LOCK => "TLB lock",
            Self::COPROCESSOR_ABORT => "Coprocessor data abort",
            Self::IMPRECISE_EXTERNAL => "Imprecise data abort",
            Self::PARITY_ERROR => "Parity error exception",
            Self::DEBUG_EVENT => "Debug event",
            _ => "Unknown status",
        }
    }

    /// Whether DFSR's domain field means anything for this status.
    #[must_use]
    pub const fn has_valid_domain(self) -> bool {
        matches!(
            self,
            Self::L2_EXTERNAL_TRANSLATION
                | Self::PAGE_TRANSLATION
                | Self::SECTION_DOMAIN
                | Self::PAGE_DOMAIN
                | Self::SECTION_PERMISSION
                | Self::PAGE_PERMISSION
                | Self::DEBUG_EVENT
        )
    }

    /// Whether FAR holds the faulting address for this status.
    /// Unknown codes are trusted.
    #[must_use]
    pub const fn has_valid_address(self) -> bool {
        !matches!(
            self,
            Self::TLB_LOCK
                | Self::COPROCESSOR_ABORT
                | Self::IMPRECISE_EXTERNAL
                | Self::PARITY_ERROR
                | Self::DEBUG_EVENT
        )
    }
}

impl fmt::Debug for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaultStatus({self})")
    }
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b{:05b} [{}]", self.0, self.description())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

/// One decoded data abort.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DataAbort {
    pub pc: u32,
    pub access: Access,
    pub status: FaultStatus,
    /// Raw domain field; see [`trusted_domain`](Self::trusted_domain).
    pub domain: u8,
    /// Raw FAR; see [`trusted_address`](Self::trusted_address).
    pub address: VirtualAddress,
}

impl DataAbort {
    #[must_use]
    pub const fn decode(pc: u32, dfsr: DataFaultStatus, far: FaultAddress) -> Self {
        Self {
            pc,
            access: if dfsr.wnr_write() { Access::Write } else { Access::Read },
            status: FaultStatus::new(dfsr.status()),
            domain: dfsr.domain(),
            address: far.address(),
        }
    }

    #[must_use]
    pub const fn trusted_address(&self) -> Option<VirtualAddress> {
        if self.status.has_valid_address() {
            Some(self.address)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn trusted_domain(&self) -> Option<Domain> {
        if self.status.has_valid_domain() {
            Some(Domain::from_bits(self.domain))
        } else {
            None
        }
    }
}

impl fmt::Display for DataAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let untrusted = |ok: bool| if ok { "" } else { " (invalid!)" };
        write!(
            f,
            "data abort at pc={:#010x}: {} access, address {}{}, domain {}{}, status {}",
            self.pc,
            match self.access {
                Access::Read => "read",
                Access::Write => "write",
            },
            self.address,
            untrusted(self.status.has_valid_address()),
            self.domain,
            untrusted(self.status.has_valid_domain()),
            self.status
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FatalReason {
    #[error("fault address is not valid for this status")]
    UntrustedAddress,
    #[error("illegal access of the null address")]
    NullDereference,
    #[error("access inside the live heap <{start}, {end}>")]
    HeapAccess { start: VirtualAddress, end: VirtualAddress },
    #[error("outside of heap <{heap_start}, {heap_end}> and stack window (below {stack_top})")]
    OutOfRange {
        heap_start: VirtualAddress,
        heap_end: VirtualAddress,
        stack_top: VirtualAddress,
    },
    #[error("no active environment to grow the stack in")]
    NoActiveEnvironment,
    #[error("page {0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("stack growth failed: {0}")]
    OutOfMemory(#[source] MapError),
}

/// A data abort the kernel cannot recover from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{reason}; {abort}")]
pub struct FatalFault {
    pub abort: DataAbort,
    pub reason: FatalReason,
}

/// What the handler did for a recoverable abort.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultResolution {
    /// `page` was identity-mapped into the active environment; the faulting
    /// instruction can be retried.
    StackGrown {
        page: VirtualAddress,
        descriptor: SmallPageDescriptor,
    },
}

/// Outcome of [`classify`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultClass {
    /// The page containing the address should be demand-mapped.
    StackGrowth { page: VirtualAddress },
    Fatal(FatalReason),
}

/// Sort an abort by its address alone.
///
/// The stack-growth window is the open interval `(heap_end, stack_top)`.
#[must_use]
pub fn classify(
    abort: &DataAbort,
    heap_start: VirtualAddress,
    heap_end: VirtualAddress,
    stack_top: VirtualAddress,
) -> FaultClass {
    let Some(address) = abort.trusted_address() else {
        return FaultClass::Fatal(FatalReason::UntrustedAddress);
    };
    if address == VirtualAddress::zero() {
        FaultClass::Fatal(FatalReason::NullDereference)
    } else if heap_end < address && address < stack_top {
        FaultClass::StackGrowth {
            page: address.align_down::<Size4K>(),
        }
    } else if heap_start <= address && address <= heap_end {
        FaultClass::Fatal(FatalReason::HeapAccess {
            start: heap_start,
            end: heap_end,
        })
    } else {
        FaultClass::Fatal(FatalReason::OutOfRange {
            heap_start,
            heap_end,
            stack_top,
        })
    }
}

impl<R: MmuRegisters, A: TableAlloc + HeapBounds, M: PhysMapper> VmManager<R, A, M> {
    /// Handle the data abort that trapped at `pc`, reading DFSR and FAR.
    ///
    /// Must run with interrupts masked: the stack-growth path mutates the
    /// active table.
    ///
    /// # Errors
    /// [`FatalFault`] for every abort other than stack growth, and for stack
    /// growth that cannot be satisfied.
    pub fn handle_data_abort(&mut self, pc: u32) -> Result<FaultResolution, FatalFault> {
        let regs = self.mmu().registers();
        let abort = DataAbort::decode(pc, regs.fault_status(), regs.fault_address());
        log::warn!("{abort}");

        let heap = self.allocator();
        let class = classify(&abort, heap.heap_start(), heap.heap_end(), self.config().stack_top);
        let result = match class {
            FaultClass::StackGrowth { page } => self.grow_stack(page),
            FaultClass::Fatal(reason) => Err(reason),
        };
        result.map_err(|reason| {
            let fatal = FatalFault { abort, reason };
            log::error!("{fatal}");
            fatal
        })
    }

    fn grow_stack(&mut self, page: VirtualAddress) -> Result<FaultResolution, FatalReason> {
        let env = *self.active().ok_or(FatalReason::NoActiveEnvironment)?;

        let space = self.address_space(env.id());
        if matches!(space.lookup_first_level(page).kind(), FirstLevelKind::Section(_))
            || space.translate(page).is_some()
        {
            return Err(FatalReason::AlreadyMapped(page));
        }

        let descriptor = self
            .map_small_page(env.id(), page, PhysicalAddress::new(page.as_u32()), MapFlags::KERNEL)
            .map_err(FatalReason::OutOfMemory)?;
        self.mmu_mut().sync_tables();
        log::info!("stack grown: {page} mapped for pid {}", env.pid());
        Ok(FaultResolution::StackGrown { page, descriptor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvId, VmConfig};
    use crate::mock::{Op, TestManager, manager_with};
    use kernel_info::memory;

    fn abort(status: FaultStatus, address: u32) -> DataAbort {
        DataAbort::decode(
            0x8040,
            DataFaultStatus::from_parts(status.bits(), 3, true),
            FaultAddress(VirtualAddress::new(address)),
        )
    }

    const HEAP_START: VirtualAddress = VirtualAddress::new(memory::HEAP_START);
    const HEAP_END: VirtualAddress = VirtualAddress::new(0x0015_0000);
    const STACK_TOP: VirtualAddress = VirtualAddress::new(memory::MAX_STACK_ADDRESS);

    fn classify_at(status: FaultStatus, address: u32) -> FaultClass {
        classify(&abort(status, address), HEAP_START, HEAP_END, STACK_TOP)
    }

    #[test]
    fn status_uses_five_bits() {
        let dfsr = DataFaultStatus::from_bits(1 << 10 | 0b0110 | 0xA << 4);
        let a = DataAbort::decode(0, dfsr, FaultAddress::default());
        assert_eq!(a.status, FaultStatus::IMPRECISE_EXTERNAL);
        assert_eq!(a.domain, 0xA);
        assert_eq!(a.access, Access::Read);
        assert_eq!(a.trusted_address(), None);
        assert_eq!(a.trusted_domain(), None);
    }

    #[test]
    fn validity_tables() {
        let trusted_domain = [0b01110, 0b00111, 0b01001, 0b01011, 0b01101, 0b01111, 0b00010];
        let untrusted_address = [0b10100, 0b11010, 0b10110, 0b11000, 0b00010];
        for bits in 0..32 {
            let s = FaultStatus::new(bits);
            assert_eq!(s.has_valid_domain(), trusted_domain.contains(&bits), "{s:?}");
            assert_eq!(s.has_valid_address(), !untrusted_address.contains(&bits), "{s:?}");
        }
    }

    #[test]
    fn descriptions() {
        assert_eq!(FaultStatus::SECTION_TRANSLATION.description(), "Section translation");
        assert_eq!(FaultStatus::PAGE_PERMISSION.description(), "Page permission fault");
        assert_eq!(FaultStatus::ALIGNMENT.description(), "Alignment issue");
        assert_eq!(FaultStatus::PMSA_TLB_MISS.description(), "PMSA - TLB miss (MPU)");
        assert_eq!(
            FaultStatus::L1_EXTERNAL_TRANSLATION.description(),
            "1st level external abort on translation"
        );
        assert_eq!(FaultStatus::PARITY_ERROR.description(), "Parity error exception");
        assert_eq!(FaultStatus::new(0b11111).description(), "Unknown status");
        assert_eq!(FaultStatus::new(0b00101).to_string(), "0b00101 [Section translation]");
    }

    #[test]
    fn report_flags_untrusted_fields() {
        let text = abort(FaultStatus::IMPRECISE_EXTERNAL, 0x1234).to_string();
        assert_eq!(
            text,
            "data abort at pc=0x00008040: write access, address 0x00001234 (invalid!), \
             domain 3 (invalid!), status 0b10110 [Imprecise data abort]"
        );
        let text = abort(FaultStatus::PAGE_DOMAIN, 0x1234).to_string();
        assert!(text.contains("address 0x00001234, domain 3, "));
    }

    #[test]
    fn null_is_fatal() {
        assert_eq!(
            classify_at(FaultStatus::SECTION_TRANSLATION, 0),
            FaultClass::Fatal(FatalReason::NullDereference)
        );
    }

    #[test]
    fn window_above_heap_grows_stack() {
        assert_eq!(
            classify_at(FaultStatus::PAGE_TRANSLATION, 0x0015_1234),
            FaultClass::StackGrowth { page: VirtualAddress::new(0x0015_1000) }
        );
        assert_eq!(
            classify_at(FaultStatus::SECTION_TRANSLATION, 0x003F_FFFC),
            FaultClass::StackGrowth { page: VirtualAddress::new(0x003F_F000) }
        );
    }

    #[test]
    fn window_bounds_are_exclusive() {
        assert!(matches!(
            classify_at(FaultStatus::SECTION_TRANSLATION, HEAP_END.as_u32()),
            FaultClass::Fatal(FatalReason::HeapAccess { .. })
        ));
        assert!(matches!(
            classify_at(FaultStatus::SECTION_TRANSLATION, STACK_TOP.as_u32()),
            FaultClass::Fatal(FatalReason::OutOfRange { .. })
        ));
    }

    #[test]
    fn far_outside_everything_is_fatal() {
        assert!(matches!(
            classify_at(FaultStatus::SECTION_TRANSLATION, 0xFFFF_FFFF),
            FaultClass::Fatal(FatalReason::OutOfRange { .. })
        ));
        assert!(matches!(
            classify_at(FaultStatus::SECTION_TRANSLATION, 0x0010_0000),
            FaultClass::Fatal(FatalReason::OutOfRange { .. })
        ));
    }

    #[test]
    fn heap_interior_is_fatal() {
        assert_eq!(
            classify_at(FaultStatus::PAGE_PERMISSION, 0x0014_8000),
            FaultClass::Fatal(FatalReason::HeapAccess { start: HEAP_START, end: HEAP_END })
        );
    }

    #[test]
    fn untrusted_address_is_fatal_whatever_its_value() {
        for status in [
            FaultStatus::TLB_LOCK,
            FaultStatus::COPROCESSOR_ABORT,
            FaultStatus::IMPRECISE_EXTERNAL,
            FaultStatus::PARITY_ERROR,
            FaultStatus::DEBUG_EVENT,
        ] {
            assert_eq!(
                classify_at(status, 0x0015_1000),
                FaultClass::Fatal(FatalReason::UntrustedAddress)
            );
        }
    }

    #[test]
    fn unknown_status_trusts_address() {
        assert!(matches!(
            classify_at(FaultStatus::new(0b11111), 0x0020_0000),
            FaultClass::StackGrowth { .. }
        ));
    }

    fn raise(vm: &mut TestManager, status: FaultStatus, domain: u8, write: bool, far: u32) {
        vm.mmu_mut()
            .registers_mut()
            .raise_abort(status.bits(), domain, write, far);
    }

    fn running() -> (TestManager, EnvId) {
        let mut vm = manager_with(VmConfig::DEFAULT, 256 * 1024);
        let env = vm.allocate().unwrap();
        vm.switch_to(env);
        (vm, env)
    }

    #[test]
    fn stack_growth_maps_exactly_one_page() {
        let (mut vm, env) = running();
        let target = vm.allocator().heap_end().as_u32() + 4096;
        raise(&mut vm, FaultStatus::PAGE_TRANSLATION, 0, true, target);

        let page = VirtualAddress::new(target);
        assert_eq!(vm.translate(env, page), None);
        let resolution = vm.handle_data_abort(0x8040).unwrap();
        let FaultResolution::StackGrown { page: grown, descriptor } = resolution;
        assert_eq!(grown, page);
        assert_eq!(descriptor.base_4k(), target >> 12);

        // the retried access now translates; its neighbours do not
        assert_eq!(vm.translate(env, page), Some(PhysicalAddress::new(target)));
        assert_eq!(vm.translate(env, VirtualAddress::new(target - 4096)), None);
        assert_eq!(vm.translate(env, VirtualAddress::new(target + 4096)), None);
        assert_eq!(vm.mmu().registers().ops.last(), Some(&Op::Barrier));
    }

    #[test]
    fn second_fault_on_grown_page_is_fatal() {
        let (mut vm, _) = running();
        let target = 0x003F_F000;
        raise(&mut vm, FaultStatus::PAGE_TRANSLATION, 1, true, target);
        assert!(vm.handle_data_abort(0x8040).is_ok());
        raise(&mut vm, FaultStatus::PAGE_PERMISSION, 1, true, target);
        let err = vm.handle_data_abort(0x8040).unwrap_err();
        assert_eq!(err.reason, FatalReason::AlreadyMapped(VirtualAddress::new(target)));
    }

    #[test]
    fn fault_inside_mapped_section_is_fatal() {
        let (mut vm, env) = running();
        vm.mmu_disable();
        vm.map_section(
            env,
            VirtualAddress::new(0x0030_0000),
            PhysicalAddress::new(0x0030_0000),
            MapFlags::KERNEL,
        );
        vm.switch_to(env);
        raise(&mut vm, FaultStatus::SECTION_PERMISSION, 1, false, 0x0030_0010);
        let err = vm.handle_data_abort(0).unwrap_err();
        assert_eq!(err.reason, FatalReason::AlreadyMapped(VirtualAddress::new(0x0030_0000)));
    }

    #[test]
    fn fatal_fault_keeps_decoded_abort() {
        let (mut vm, env) = running();
        raise(&mut vm, FaultStatus::SECTION_TRANSLATION, 2, false, 0);
        let err = vm.handle_data_abort(0x9000).unwrap_err();
        assert_eq!(err.reason, FatalReason::NullDereference);
        assert_eq!(err.abort.pc, 0x9000);
        assert_eq!(err.abort.access, Access::Read);
        assert_eq!(vm.address_space(env).first_level_mapped(), 0);
    }

    #[test]
    fn far_away_address_is_fatal() {
        let (mut vm, _) = running();
        raise(&mut vm, FaultStatus::SECTION_TRANSLATION, 0, false, 0xFFFF_FFFF);
        assert!(matches!(
            vm.handle_data_abort(0).unwrap_err().reason,
            FatalReason::OutOfRange { .. }
        ));
    }

    #[test]
    fn untrusted_far_never_maps() {
        let (mut vm, env) = running();
        let target = vm.allocator().heap_end().as_u32() + 4096;
        raise(&mut vm, FaultStatus::IMPRECISE_EXTERNAL, 0, true, target);
        assert_eq!(
            vm.handle_data_abort(0).unwrap_err().reason,
            FatalReason::UntrustedAddress
        );
        assert_eq!(vm.translate(env, VirtualAddress::new(target)), None);
    }

    #[test]
    fn growth_without_active_environment_is_fatal() {
        let mut vm = manager_with(VmConfig::DEFAULT, 256 * 1024);
        let _ = vm.allocate().unwrap();
        raise(&mut vm, FaultStatus::PAGE_TRANSLATION, 0, true, 0x0030_0000);
        assert_eq!(
            vm.handle_data_abort(0).unwrap_err().reason,
            FatalReason::NoActiveEnvironment
        );
    }

    #[test]
    fn growth_without_table_memory_is_fatal() {
        let mut vm = manager_with(VmConfig::DEFAULT, 16 * 1024);
        let env = vm.allocate().unwrap();
        vm.switch_to(env);
        raise(&mut vm, FaultStatus::PAGE_TRANSLATION, 0, true, 0x0030_0000);
        assert!(matches!(
            vm.handle_data_abort(0).unwrap_err().reason,
            FatalReason::OutOfMemory(MapError::OutOfMemory { .. })
        ));
    }
}
