//! Arena-backed bitmap storage.
//!
//! A [`WordArena`] hands out word runs that live until the arena itself is
//! dropped. Freeing an individual run is a no-op; the borrow checker ties
//! every [`ArenaBitMap`] to the arena it came from.

use super::chunks::{Chunks, DEFAULT_CHUNK_WORDS};
use crate::growable::{BitMapAllocator, GrowableBitMap};
use gc_core::AllocResult;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A thread-safe bump arena of bitmap words.
pub struct WordArena {
    chunks: Mutex<Chunks>,
}

impl WordArena {
    /// An arena with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_words(DEFAULT_CHUNK_WORDS)
    }

    /// An arena that allocates chunks of at least `chunk_words` words.
    pub fn with_chunk_words(chunk_words: usize) -> Self {
        Self {
            chunks: Mutex::new(Chunks::new(chunk_words)),
        }
    }

    /// Words handed out so far.
    pub fn used_words(&self) -> usize {
        self.chunks.lock().used_words()
    }

    /// Words reserved from the system.
    pub fn reserved_words(&self) -> usize {
        self.chunks.lock().reserved_words()
    }

    /// Allocates `words` words that live as long as the arena.
    pub fn alloc_words(&self, words: usize) -> AllocResult<&[AtomicUsize]> {
        if words == 0 {
            return Ok(&[]);
        }
        let ptr = self.chunks.lock().alloc(words)?;
        // SAFETY: chunks are only released when the arena drops, which the
        // returned borrow of `self` prevents.
        Ok(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), words) })
    }

    fn grow_words<'a>(
        &'a self,
        old: &'a [AtomicUsize],
        new_words: usize,
    ) -> Option<&'a [AtomicUsize]> {
        if new_words <= old.len() {
            return Some(&old[..new_words]);
        }
        if !self.chunks.lock().try_grow_last(old, new_words) {
            return None;
        }
        // SAFETY: try_grow_last reserved the words following `old` in the
        // same chunk.
        Some(unsafe { std::slice::from_raw_parts(old.as_ptr(), new_words) })
    }
}

impl Default for WordArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WordArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chunks = self.chunks.lock();
        f.debug_struct("WordArena")
            .field("used_words", &chunks.used_words())
            .field("reserved_words", &chunks.reserved_words())
            .finish()
    }
}

/// Storage policy allocating from a [`WordArena`].
#[derive(Debug, Clone, Copy)]
pub struct ArenaAllocator<'a> {
    arena: &'a WordArena,
}

impl<'a> ArenaAllocator<'a> {
    /// Policy allocating from `arena`.
    pub fn new(arena: &'a WordArena) -> Self {
        Self { arena }
    }
}

impl<'a> BitMapAllocator for ArenaAllocator<'a> {
    type Words = &'a [AtomicUsize];

    fn allocate(&self, size_in_words: usize) -> AllocResult<Self::Words> {
        self.arena.alloc_words(size_in_words)
    }

    fn reallocate(
        &self,
        old: &Self::Words,
        old_size_in_words: usize,
        new_size_in_words: usize,
    ) -> AllocResult<Self::Words> {
        debug_assert_eq!(old.len(), old_size_in_words);
        if let Some(words) = self.arena.grow_words(*old, new_size_in_words) {
            return Ok(words);
        }
        let new_map = self.arena.alloc_words(new_size_in_words)?;
        for (dst, src) in new_map.iter().zip(old.iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        Ok(new_map)
    }

    fn free(&self, _words: Self::Words, _size_in_words: usize) {
        // Released with the arena.
    }
}

/// A bitmap whose words live in a [`WordArena`].
pub type ArenaBitMap<'a> = GrowableBitMap<ArenaAllocator<'a>>;

impl<'a> GrowableBitMap<ArenaAllocator<'a>> {
    /// A bitmap of `size_in_bits` bits allocated from `arena`.
    pub fn new(arena: &'a WordArena, size_in_bits: usize, clear: bool) -> AllocResult<Self> {
        Self::new_in(ArenaAllocator::new(arena), size_in_bits, clear)
    }
}
