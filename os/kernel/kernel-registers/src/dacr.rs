use core::fmt;

/// Number of protection domains the short-descriptor format can address.
pub const DOMAIN_COUNT: u8 = 16;

/// A 4-bit protection domain id, as carried in section and coarse-table descriptors.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Domain(u8);

impl Domain {
    /// # Panics
    /// Panics if `id` does not fit into the 4-bit domain field.
    #[inline]
    #[must_use]
    pub const fn new(id: u8) -> Self {
        assert!(id < DOMAIN_COUNT, "domain id out of range");
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0xF)
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Domain({})", self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Per-domain access type held in the Domain Access Control Register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DomainAccess {
    /// Any access generates a domain fault.
    NoAccess = 0b00,
    /// Accesses are checked against the descriptor's access permission bits.
    Client = 0b01,
    /// Reserved encoding; behaves like `NoAccess`.
    Reserved = 0b10,
    /// Accesses are never checked against permission bits.
    Manager = 0b11,
}

impl DomainAccess {
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::NoAccess,
            0b01 => Self::Client,
            0b10 => Self::Reserved,
            _ => Self::Manager,
        }
    }
}

/// DACR — CP15 c3 Domain Access Control Register.
///
/// Sixteen 2-bit fields; the field for domain `d` lives at bit `2 × d`.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct DomainAccessControl(u32);

impl DomainAccessControl {
    /// All domains set to [`DomainAccess::NoAccess`].
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0
    }

    /// A register value granting `access` to `domain` and no access to any other domain.
    #[must_use]
    pub const fn only(domain: Domain, access: DomainAccess) -> Self {
        Self::new().with(domain, access)
    }

    #[must_use]
    pub const fn get(self, domain: Domain) -> DomainAccess {
        let shift = 2 * domain.id() as u32;
        DomainAccess::from_bits(((self.0 >> shift) & 0b11) as u8)
    }

    #[must_use]
    pub const fn with(self, domain: Domain, access: DomainAccess) -> Self {
        let shift = 2 * domain.id() as u32;
        Self((self.0 & !(0b11 << shift)) | ((access.into_bits() as u32) << shift))
    }

    pub const fn set(&mut self, domain: Domain, access: DomainAccess) {
        *self = self.with(domain, access);
    }
}

impl fmt::Debug for DomainAccessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainAccessControl(0b{:032b})", self.0)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::LoadRegisterUnsafe for DomainAccessControl {
    unsafe fn load_unsafe() -> Self {
        let value: u32;
        unsafe {
            core::arch::asm!(
                "mrc p15, 0, {}, c3, c0, 0",
                out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(value)
    }
}

#[cfg(all(feature = "asm", target_arch = "arm"))]
impl crate::StoreRegisterUnsafe for DomainAccessControl {
    unsafe fn store_unsafe(self) {
        let value = self.into_bits();
        unsafe {
            core::arch::asm!(
                "mcr p15, 0, {}, c3, c0, 0",
                "mcr p15, 0, {zero}, c7, c5, 4",
                in(reg) value,
                zero = in(reg) 0u32,
                options(nostack, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_field_lands_at_twice_the_domain() {
        for id in 0..DOMAIN_COUNT {
            let dacr = DomainAccessControl::only(Domain::new(id), DomainAccess::Client);
            assert_eq!(dacr.into_bits(), 0b01 << (2 * u32::from(id)));
        }
    }

    #[test]
    fn with_replaces_existing_field() {
        let d = Domain::new(3);
        let dacr =
            DomainAccessControl::only(d, DomainAccess::Manager).with(d, DomainAccess::Client);
        assert_eq!(dacr.get(d), DomainAccess::Client);
        assert_eq!(dacr.into_bits(), 0b01 << 6);
    }

    #[test]
    fn other_domains_untouched() {
        let mut dacr = DomainAccessControl::from_bits(u32::MAX);
        dacr.set(Domain::new(15), DomainAccess::NoAccess);
        assert_eq!(dacr.into_bits(), 0x3FFF_FFFF);
        assert_eq!(dacr.get(Domain::new(14)), DomainAccess::Manager);
    }

    #[test]
    #[should_panic(expected = "domain id out of range")]
    fn domain_must_fit_four_bits() {
        let _ = Domain::new(16);
    }
}
