//! Bump allocation of words out of a list of chunks.
//!
//! Shared by the arena and resource-area policies. The chunk list itself is
//! not synchronized; each policy wraps it in the lock or cell it needs.

use gc_core::{AllocError, AllocResult};
use std::ptr::NonNull;
use std::sync::atomic::AtomicUsize;

/// Default chunk size in words.
pub(crate) const DEFAULT_CHUNK_WORDS: usize = 1024;

/// Position in a [`Chunks`] list that allocation can be rolled back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkState {
    chunk_count: usize,
    top: usize,
    used_words: usize,
}

/// A list of word chunks allocated with a bump pointer in the last chunk.
///
/// Chunks are held as raw pointers so that growing the list never moves or
/// re-borrows memory that slices handed out earlier still point into.
pub(crate) struct Chunks {
    chunks: Vec<NonNull<[AtomicUsize]>>,
    top: usize,
    used_words: usize,
    chunk_words: usize,
}

// SAFETY: the chunks are uniquely owned heap allocations of atomics, which
// are themselves Send + Sync.
unsafe impl Send for Chunks {}

impl Chunks {
    pub(crate) fn new(chunk_words: usize) -> Self {
        Self {
            chunks: Vec::new(),
            top: 0,
            used_words: 0,
            chunk_words: chunk_words.max(1),
        }
    }

    pub(crate) fn used_words(&self) -> usize {
        self.used_words
    }

    pub(crate) fn reserved_words(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    fn remaining_in_last(&self) -> usize {
        self.chunks.last().map_or(0, |c| c.len() - self.top)
    }

    fn push_chunk(&mut self, min_words: usize) -> AllocResult<()> {
        let words = min_words.max(self.chunk_words);
        let mut chunk: Vec<AtomicUsize> = Vec::new();
        chunk
            .try_reserve_exact(words)
            .map_err(|_| AllocError::OutOfMemory { words })?;
        chunk.resize_with(words, || AtomicUsize::new(0));
        let chunk: &mut [AtomicUsize] = Box::leak(chunk.into_boxed_slice());
        self.chunks.push(NonNull::from(chunk));
        self.top = 0;
        log::trace!("new bitmap chunk of {} words", words);
        Ok(())
    }

    /// Bumps `words` words off the last chunk, adding a chunk if needed.
    ///
    /// The returned pointer is valid for `words` words until the chunk
    /// holding it is released by [`Chunks::rollback`] or drop.
    pub(crate) fn alloc(&mut self, words: usize) -> AllocResult<NonNull<AtomicUsize>> {
        if words == 0 {
            return Ok(NonNull::dangling());
        }
        if self.remaining_in_last() < words {
            self.push_chunk(words)?;
        }
        let start = self.top;
        self.top += words;
        self.used_words += words;
        let chunk = self.chunks[self.chunks.len() - 1];
        // SAFETY: start + words <= chunk.len(), checked above.
        Ok(unsafe { NonNull::new_unchecked((chunk.as_ptr() as *mut AtomicUsize).add(start)) })
    }

    /// Extends the most recent allocation in place when it ends at the bump
    /// pointer and the chunk has room. Returns false otherwise.
    pub(crate) fn try_grow_last(&mut self, old: &[AtomicUsize], new_words: usize) -> bool {
        let Some(chunk) = self.chunks.last() else {
            return false;
        };
        let extra = new_words - old.len();
        let base = chunk.as_ptr() as *const AtomicUsize;
        // SAFETY: top <= chunk.len(), so this is at most one past the end.
        let bump = unsafe { base.add(self.top) };
        if old.as_ptr_range().end != bump || chunk.len() - self.top < extra {
            return false;
        }
        self.top += extra;
        self.used_words += extra;
        true
    }

    pub(crate) fn state(&self) -> ChunkState {
        ChunkState {
            chunk_count: self.chunks.len(),
            top: self.top,
            used_words: self.used_words,
        }
    }

    /// Releases everything allocated after `state` was taken.
    ///
    /// # Safety
    ///
    /// No reference into memory allocated after `state` may still be live.
    pub(crate) unsafe fn rollback(&mut self, state: ChunkState) {
        for chunk in self.chunks.drain(state.chunk_count..) {
            drop(Box::from_raw(chunk.as_ptr()));
        }
        self.top = state.top;
        self.used_words = state.used_words;
    }
}

impl Drop for Chunks {
    fn drop(&mut self) {
        for chunk in self.chunks.drain(..) {
            // SAFETY: each chunk came from Box::leak in push_chunk, and the
            // owner of this list guarantees no slices into it outlive it.
            unsafe { drop(Box::from_raw(chunk.as_ptr())) };
        }
    }
}
