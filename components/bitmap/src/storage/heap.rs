//! Heap-owned bitmap storage with per-tag accounting.

use crate::growable::{BitMapAllocator, GrowableBitMap};
use gc_core::{AllocError, AllocResult, BYTES_PER_WORD};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Accounting category for heap-allocated bitmap words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemTag {
    /// Collector data structures (mark bitmaps, card tables).
    Gc,
    /// Compiled-code metadata.
    Code,
    /// Runtime-internal bookkeeping.
    Internal,
    /// Reserved for tests.
    Test,
}

const TAG_COUNT: usize = 4;

static RESERVED_BYTES: [AtomicUsize; TAG_COUNT] = [
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
];

impl MemTag {
    fn slot(self) -> &'static AtomicUsize {
        &RESERVED_BYTES[self as usize]
    }

    /// Bytes of bitmap storage currently held under this tag.
    pub fn reserved_bytes(self) -> usize {
        self.slot().load(Ordering::Relaxed)
    }

    fn record_alloc(self, words: usize) {
        self.slot().fetch_add(words * BYTES_PER_WORD, Ordering::Relaxed);
    }

    fn record_free(self, words: usize) {
        self.slot().fetch_sub(words * BYTES_PER_WORD, Ordering::Relaxed);
    }
}

/// Storage policy allocating individually owned words from the global heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapAllocator {
    tag: MemTag,
}

impl HeapAllocator {
    /// Policy charging allocations to `tag`.
    pub fn new(tag: MemTag) -> Self {
        Self { tag }
    }

    /// The accounting tag.
    pub fn tag(&self) -> MemTag {
        self.tag
    }
}

impl BitMapAllocator for HeapAllocator {
    type Words = Box<[AtomicUsize]>;

    fn allocate(&self, size_in_words: usize) -> AllocResult<Self::Words> {
        let mut words: Vec<AtomicUsize> = Vec::new();
        words
            .try_reserve_exact(size_in_words)
            .map_err(|_| AllocError::OutOfMemory {
                words: size_in_words,
            })?;
        words.resize_with(size_in_words, || AtomicUsize::new(0));
        self.tag.record_alloc(size_in_words);
        Ok(words.into_boxed_slice())
    }

    fn free(&self, words: Self::Words, _size_in_words: usize) {
        self.tag.record_free(words.len());
    }
}

/// A bitmap owning heap words charged to a [`MemTag`].
pub type CHeapBitMap = GrowableBitMap<HeapAllocator>;

impl GrowableBitMap<HeapAllocator> {
    /// A bitmap of `size_in_bits` bits charged to `tag`.
    pub fn new(size_in_bits: usize, tag: MemTag, clear: bool) -> AllocResult<Self> {
        Self::new_in(HeapAllocator::new(tag), size_in_bits, clear)
    }

    /// An empty bitmap charged to `tag` once it allocates.
    pub fn with_tag(tag: MemTag) -> Self {
        Self::with_allocator(HeapAllocator::new(tag))
    }
}
