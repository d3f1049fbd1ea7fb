//! # Kernel Memory Allocation
//!
//! Allocation primitives the virtual-memory code is built on.
//!
//! ## Components
//!
//! ### Bit-Vector Allocator ([`bitvec`])
//!
//! Hands out small integer ids from a fixed-capacity bitmap, lowest free id
//! first. One instance each tracks protection domains, ASIDs and environment
//! slots. Double frees are reported as errors instead of being ignored.
//!
//! ### Bump Allocator ([`bump`])
//!
//! A never-freeing heap over a physical range. Page tables are carved out of
//! it with [`TableAlloc`](kernel_vmem::TableAlloc), and the fault handler
//! reads its current bounds through [`HeapBounds`](kernel_vmem::HeapBounds).
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! The identity [`PhysMapper`](kernel_vmem::PhysMapper) used on hardware.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::bitvec::BitVector;
//! use kernel_alloc::bump::BumpAllocator;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let mut asids = BitVector::new(1, 64);
//! assert_eq!(asids.allocate(), Ok(1));
//!
//! let mut heap = BumpAllocator::new(
//!     PhysicalAddress::new(0x0014_0000),
//!     PhysicalAddress::new(0x0020_0000),
//! );
//! let table = heap.allocate_aligned(16 * 1024, 16 * 1024).unwrap();
//! assert_eq!(table.as_u32() % (16 * 1024), 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod bitvec;
pub mod bump;
pub mod phys_mapper;
