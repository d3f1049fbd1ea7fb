//! # Bit-Vector Id Allocator
//!
//! A fixed-capacity occupancy bitmap that hands out the lowest free id.
//! Used for protection domains, ASIDs and environment slots.

/// Largest capacity a [`BitVector`] can track; enough for the full 8-bit ASID space.
pub const MAX_CAPACITY: usize = 256;

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = MAX_CAPACITY / WORD_BITS;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitVectorError {
    /// Every id in the vector is in use.
    #[error("all {capacity} ids are allocated")]
    Exhausted { capacity: usize },
    /// The id was freed without being allocated, or was freed twice.
    #[error("id {0} is not allocated")]
    NotAllocated(usize),
    /// The id lies outside the vector's capacity.
    #[error("id {id} is out of range (capacity {capacity})")]
    OutOfRange { id: usize, capacity: usize },
}

/// First-fit id allocator over a fixed-size bitmap.
///
/// # Invariants
/// - An id is handed out by [`allocate`](Self::allocate) at most once until it
///   is returned through [`free`](Self::free).
/// - The first `reserved` ids given to [`new`](Self::new) start out allocated
///   and are never handed out unless explicitly freed.
#[derive(Clone)]
pub struct BitVector {
    words: [u64; WORDS],
    capacity: usize,
}

impl BitVector {
    /// Creates a vector with `capacity` ids of which the first `reserved` are
    /// already marked allocated.
    ///
    /// # Panics
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`] or `reserved > capacity`.
    #[must_use]
    pub const fn new(reserved: usize, capacity: usize) -> Self {
        assert!(capacity <= MAX_CAPACITY, "bit vector capacity too large");
        assert!(reserved <= capacity, "more reserved ids than capacity");

        let mut words = [0u64; WORDS];
        let mut id = 0;
        while id < reserved {
            words[id / WORD_BITS] |= 1 << (id % WORD_BITS);
            id += 1;
        }
        Self { words, capacity }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ids currently marked allocated, reserved ones included.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether `id` is currently allocated. Ids beyond the capacity never are.
    #[must_use]
    pub const fn is_allocated(&self, id: usize) -> bool {
        id < self.capacity && self.words[id / WORD_BITS] & (1 << (id % WORD_BITS)) != 0
    }

    /// Allocates the lowest free id.
    ///
    /// # Errors
    /// [`BitVectorError::Exhausted`] if no id is free.
    pub fn allocate(&mut self) -> Result<usize, BitVectorError> {
        for (index, word) in self.words.iter_mut().enumerate() {
            if *word == u64::MAX {
                continue;
            }

            let id = index * WORD_BITS + word.trailing_ones() as usize;
            if id >= self.capacity {
                break;
            }

            *word |= 1 << (id % WORD_BITS);
            return Ok(id);
        }

        Err(BitVectorError::Exhausted {
            capacity: self.capacity,
        })
    }

    /// Returns `id` to the vector.
    ///
    /// # Errors
    /// - [`BitVectorError::OutOfRange`] if `id` is not below the capacity.
    /// - [`BitVectorError::NotAllocated`] on a double free or a free of an id
    ///   that was never handed out.
    pub const fn free(&mut self, id: usize) -> Result<(), BitVectorError> {
        if id >= self.capacity {
            return Err(BitVectorError::OutOfRange {
                id,
                capacity: self.capacity,
            });
        }
        if !self.is_allocated(id) {
            return Err(BitVectorError::NotAllocated(id));
        }

        self.words[id / WORD_BITS] &= !(1 << (id % WORD_BITS));
        Ok(())
    }
}

impl core::fmt::Debug for BitVector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BitVector")
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reserved_ids_are_skipped() {
        let mut bv = BitVector::new(1, 16);
        assert!(bv.is_allocated(0));
        assert_eq!(bv.allocate(), Ok(1));
        assert_eq!(bv.allocate(), Ok(2));
    }

    #[test]
    fn exhaustion_after_capacity() {
        let mut bv = BitVector::new(0, 8);
        for expected in 0..8 {
            assert_eq!(bv.allocate(), Ok(expected));
        }
        assert_eq!(bv.allocate(), Err(BitVectorError::Exhausted { capacity: 8 }));
    }

    #[test]
    fn reserved_counts_against_capacity() {
        let mut bv = BitVector::new(1, 64);
        for _ in 1..64 {
            bv.allocate().unwrap();
        }
        assert_eq!(bv.allocated_count(), 64);
        assert!(matches!(bv.allocate(), Err(BitVectorError::Exhausted { .. })));
    }

    #[test]
    fn freed_id_is_reused_first() {
        let mut bv = BitVector::new(1, 16);
        let a = bv.allocate().unwrap();
        let b = bv.allocate().unwrap();
        let _c = bv.allocate().unwrap();
        bv.free(b).unwrap();
        assert_eq!(bv.allocate(), Ok(b));
        bv.free(a).unwrap();
        assert_eq!(bv.allocate(), Ok(a));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut bv = BitVector::new(0, 4);
        let id = bv.allocate().unwrap();
        assert_eq!(bv.free(id), Ok(()));
        assert_eq!(bv.free(id), Err(BitVectorError::NotAllocated(id)));
    }

    #[test]
    fn free_of_never_allocated_is_rejected() {
        let mut bv = BitVector::new(0, 4);
        assert_eq!(bv.free(3), Err(BitVectorError::NotAllocated(3)));
        assert_eq!(
            bv.free(4),
            Err(BitVectorError::OutOfRange { id: 4, capacity: 4 })
        );
    }

    #[test]
    fn spans_multiple_words() {
        let mut bv = BitVector::new(70, MAX_CAPACITY);
        assert_eq!(bv.allocate(), Ok(70));
        assert!(bv.is_allocated(63));
        assert!(bv.is_allocated(64));
        assert!(!bv.is_allocated(71));
    }

    #[test]
    fn full_vector_without_reservation() {
        let mut bv = BitVector::new(MAX_CAPACITY, MAX_CAPACITY);
        assert!(matches!(bv.allocate(), Err(BitVectorError::Exhausted { .. })));
        bv.free(200).unwrap();
        assert_eq!(bv.allocate(), Ok(200));
    }

    proptest! {
        #[test]
        fn allocations_are_unique_until_exhausted(
            capacity in 1usize..=MAX_CAPACITY,
            reserved_frac in 0usize..=100,
        ) {
            let reserved = capacity * reserved_frac / 100;
            let mut bv = BitVector::new(reserved, capacity);
            let mut seen = std::collections::BTreeSet::new();

            for _ in reserved..capacity {
                let id = bv.allocate().unwrap();
                prop_assert!(id >= reserved && id < capacity);
                prop_assert!(seen.insert(id));
            }

            let exhausted = matches!(bv.allocate(), Err(BitVectorError::Exhausted { .. }));
            prop_assert!(exhausted);
        }

        #[test]
        fn free_then_allocate_returns_lowest(
            capacity in 2usize..=64,
            frees in proptest::collection::vec(0usize..64, 1..8),
        ) {
            let mut bv = BitVector::new(0, capacity);
            for _ in 0..capacity {
                bv.allocate().unwrap();
            }

            let mut freed: Vec<usize> = frees.into_iter().filter(|id| *id < capacity).collect();
            freed.sort_unstable();
            freed.dedup();
            for id in &freed {
                bv.free(*id).unwrap();
            }

            for id in freed {
                prop_assert_eq!(bv.allocate(), Ok(id));
            }
        }
    }
}
