//! Memory orderings for parallel bitmap access.
//!
//! The parallel bitmap accessors take a [`MemoryOrder`] rather than a raw
//! [`std::sync::atomic::Ordering`] because a single request has to drive two
//! different accesses: the initial load of the containing word and the
//! compare-and-swap that publishes the new value. `Conservative` asks for a
//! full two-way barrier around both, which is what marking uses when the bit
//! guards the visibility of the object it describes.

use crate::word::BmWord;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// Memory ordering requested from a parallel bitmap operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryOrder {
    /// No ordering beyond atomicity of the word access.
    Relaxed,
    /// Accesses that observe the word have acquire semantics.
    Acquire,
    /// Writes to the word have release semantics.
    Release,
    /// Acquire on reads, release on writes.
    AcqRel,
    /// Full fence semantics: acquire-on-read and release-on-write, plus a
    /// leading fence so preceding accesses cannot be reordered past the load.
    #[default]
    Conservative,
}

impl MemoryOrder {
    /// Returns true if an access that observes a word under this order
    /// carries acquire semantics.
    pub fn is_acquire(self) -> bool {
        matches!(
            self,
            MemoryOrder::Acquire | MemoryOrder::AcqRel | MemoryOrder::Conservative
        )
    }

    /// Success and failure orderings for a compare-and-swap under this order.
    ///
    /// Rust forbids `Release`/`AcqRel` as a failure ordering, so the failure
    /// side degrades to the strongest permitted load ordering.
    pub fn cmpxchg_orderings(self) -> (Ordering, Ordering) {
        match self {
            MemoryOrder::Relaxed => (Ordering::Relaxed, Ordering::Relaxed),
            MemoryOrder::Acquire => (Ordering::Acquire, Ordering::Acquire),
            MemoryOrder::Release => (Ordering::Release, Ordering::Relaxed),
            MemoryOrder::AcqRel => (Ordering::AcqRel, Ordering::Acquire),
            MemoryOrder::Conservative => (Ordering::SeqCst, Ordering::SeqCst),
        }
    }

    /// Ordering for a single read-modify-write (`fetch_or` / `fetch_and`).
    pub fn rmw_ordering(self) -> Ordering {
        self.cmpxchg_orderings().0
    }
}

/// Loads `word` with the load half of `order`.
///
/// `Relaxed` and `Release` load relaxed, `Acquire` and `AcqRel` load with
/// acquire, and `Conservative` issues a full fence before an acquiring load.
#[inline]
pub fn load_word_ordered(word: &AtomicUsize, order: MemoryOrder) -> BmWord {
    match order {
        MemoryOrder::Relaxed | MemoryOrder::Release => word.load(Ordering::Relaxed),
        MemoryOrder::Acquire | MemoryOrder::AcqRel => word.load(Ordering::Acquire),
        MemoryOrder::Conservative => {
            fence(Ordering::SeqCst);
            word.load(Ordering::Acquire)
        }
    }
}
