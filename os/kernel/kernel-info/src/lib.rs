//! # Kernel Configuration
//!
//! Compile-time constants shared between the kernel's build script, the
//! virtual-memory crates and the board bring-up code.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! The physical (and, since the kernel identity-maps itself, virtual) layout
//! of the low 4 MiB: kernel image, exception stacks, the heap that also backs
//! page tables, and the system stack whose lower end is grown on demand.
//!
//! ### Virtual-Memory Capacities ([`vm`])
//! How many domains, ASIDs and environments exist, and which ids are reserved.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory::{HEAP_START, SYSTEM_STACK_TOP};
//!
//! // The stack-growth window lies between the heap and the stack top.
//! assert!(HEAP_START < SYSTEM_STACK_TOP);
//! ```
//!
//! All layout invariants are checked with `const` assertions, so an invalid
//! configuration fails to compile.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod vm;
