//! # Virtual-Memory Capacities
//!
//! Hardware and policy limits for the identifiers handed out per environment.

/// Protection domains addressable by the 4-bit descriptor field.
pub const DOMAIN_CAPACITY: usize = 16;

/// Domain 0 is reserved for kernel mappings.
pub const RESERVED_DOMAINS: usize = 1;

/// Address space identifiers handed out to environments.
pub const ASID_CAPACITY: usize = 64;

/// ASID 0 is reserved for the switch sequence.
pub const RESERVED_ASIDS: usize = 1;

/// Maximum number of live environments.
pub const MAX_ENVIRONMENTS: usize = 8;

/// Entries in a first-level table.
pub const FIRST_LEVEL_ENTRIES: usize = 4096;

/// Entries in a coarse second-level table.
pub const COARSE_ENTRIES: usize = 256;

const _: () = {
    assert!(DOMAIN_CAPACITY <= 16);
    assert!(ASID_CAPACITY <= 256);
    assert!(RESERVED_DOMAINS < DOMAIN_CAPACITY);
    assert!(RESERVED_ASIDS < ASID_CAPACITY);
    assert!(MAX_ENVIRONMENTS <= DOMAIN_CAPACITY - RESERVED_DOMAINS);
};
