//! Scoped, thread-local bitmap storage.
//!
//! A [`ResourceArea`] is a bump allocator owned by one thread. Allocation
//! happens through a [`ResourceMark`]; when the mark drops, everything
//! allocated since it was taken is released at once. Marks nest, and only
//! the innermost live mark may allocate.
//!
//! ```
//! use bitmap::{BitMap, ResourceArea, ResourceBitMap};
//!
//! let area = ResourceArea::new();
//! {
//!     let rm = area.mark();
//!     let bm = ResourceBitMap::new(&rm, 128, true).unwrap();
//!     bm.set_bit(7);
//!     assert_eq!(bm.count_one_bits(), 1);
//! }
//! assert_eq!(area.used_words(), 0);
//! ```

use super::chunks::{ChunkState, Chunks, DEFAULT_CHUNK_WORDS};
use crate::growable::{BitMapAllocator, GrowableBitMap};
use gc_core::{guarantee, AllocResult};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-local bump area released in scopes.
///
/// Neither `Send` nor `Sync`: marks and the bitmaps allocated through them
/// stay on the creating thread.
pub struct ResourceArea {
    chunks: RefCell<Chunks>,
    nesting: Cell<usize>,
}

impl ResourceArea {
    /// An area with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_words(DEFAULT_CHUNK_WORDS)
    }

    /// An area that allocates chunks of at least `chunk_words` words.
    pub fn with_chunk_words(chunk_words: usize) -> Self {
        Self {
            chunks: RefCell::new(Chunks::new(chunk_words)),
            nesting: Cell::new(0),
        }
    }

    /// Opens a new innermost scope.
    pub fn mark(&self) -> ResourceMark<'_> {
        let depth = self.nesting.get() + 1;
        self.nesting.set(depth);
        ResourceMark {
            area: self,
            saved: self.chunks.borrow().state(),
            depth,
        }
    }

    /// Number of live marks.
    pub fn nesting(&self) -> usize {
        self.nesting.get()
    }

    /// Words allocated and not yet released.
    pub fn used_words(&self) -> usize {
        self.chunks.borrow().used_words()
    }
}

impl Default for ResourceArea {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceArea")
            .field("nesting", &self.nesting.get())
            .field("used_words", &self.used_words())
            .finish()
    }
}

/// A scope in a [`ResourceArea`].
///
/// Allocations made through the mark borrow it, so they cannot outlive the
/// scope that releases them.
pub struct ResourceMark<'a> {
    area: &'a ResourceArea,
    saved: ChunkState,
    depth: usize,
}

impl<'a> ResourceMark<'a> {
    /// The area this mark belongs to.
    pub fn area(&self) -> &'a ResourceArea {
        self.area
    }

    fn check_innermost(&self) {
        guarantee!(
            self.depth == self.area.nesting.get(),
            "allocation through resource mark at depth {} while depth {} is active",
            self.depth,
            self.area.nesting.get()
        );
    }

    /// Allocates `words` words released when this mark drops.
    pub fn alloc_words(&self, words: usize) -> AllocResult<&[AtomicUsize]> {
        self.check_innermost();
        if words == 0 {
            return Ok(&[]);
        }
        let ptr = self.area.chunks.borrow_mut().alloc(words)?;
        // SAFETY: the words stay allocated until this mark (or an outer one)
        // rolls back, and the result borrows this mark.
        Ok(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), words) })
    }

    fn grow_words<'m>(&'m self, old: &'m [AtomicUsize], new_words: usize) -> Option<&'m [AtomicUsize]> {
        self.check_innermost();
        if new_words <= old.len() {
            return Some(&old[..new_words]);
        }
        if !self.area.chunks.borrow_mut().try_grow_last(old, new_words) {
            return None;
        }
        // SAFETY: try_grow_last reserved the words following `old`.
        Some(unsafe { std::slice::from_raw_parts(old.as_ptr(), new_words) })
    }
}

impl Drop for ResourceMark<'_> {
    fn drop(&mut self) {
        guarantee!(
            self.depth == self.area.nesting.get(),
            "resource mark at depth {} released out of order (depth {} is active)",
            self.depth,
            self.area.nesting.get()
        );
        // SAFETY: everything allocated since `saved` borrows this mark or an
        // inner mark, and inner marks have already been dropped.
        unsafe { self.area.chunks.borrow_mut().rollback(self.saved) };
        self.area.nesting.set(self.depth - 1);
    }
}

impl fmt::Debug for ResourceMark<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMark")
            .field("depth", &self.depth)
            .finish()
    }
}

/// Storage policy allocating through a [`ResourceMark`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceAllocator<'m> {
    mark: &'m ResourceMark<'m>,
}

impl<'m> ResourceAllocator<'m> {
    /// Policy allocating through `mark`.
    pub fn new(mark: &'m ResourceMark<'m>) -> Self {
        Self { mark }
    }
}

impl<'m> BitMapAllocator for ResourceAllocator<'m> {
    type Words = &'m [AtomicUsize];

    fn allocate(&self, size_in_words: usize) -> AllocResult<Self::Words> {
        self.mark.alloc_words(size_in_words)
    }

    fn reallocate(
        &self,
        old: &Self::Words,
        _old_size_in_words: usize,
        new_size_in_words: usize,
    ) -> AllocResult<Self::Words> {
        if let Some(words) = self.mark.grow_words(*old, new_size_in_words) {
            return Ok(words);
        }
        let new_map = self.mark.alloc_words(new_size_in_words)?;
        for (dst, src) in new_map.iter().zip(old.iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        Ok(new_map)
    }

    fn free(&self, _words: Self::Words, _size_in_words: usize) {
        // Released when the mark drops.
    }
}

/// A bitmap whose words live until a [`ResourceMark`] drops.
pub type ResourceBitMap<'m> = GrowableBitMap<ResourceAllocator<'m>>;

impl<'m> GrowableBitMap<ResourceAllocator<'m>> {
    /// A bitmap of `size_in_bits` bits allocated through `mark`.
    pub fn new(mark: &'m ResourceMark<'m>, size_in_bits: usize, clear: bool) -> AllocResult<Self> {
        Self::new_in(ResourceAllocator::new(mark), size_in_bits, clear)
    }
}
