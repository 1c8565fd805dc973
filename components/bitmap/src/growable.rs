//! Owning, resizable bitmaps parameterized by a storage policy.
//!
//! [`GrowableBitMap`] owns its words and obtains them from a
//! [`BitMapAllocator`]. Three policies ship with the crate:
//!
//! | Alias | Policy | Storage lifetime |
//! |-------|--------|------------------|
//! | [`ArenaBitMap`](crate::ArenaBitMap) | [`ArenaAllocator`](crate::ArenaAllocator) | until the arena drops |
//! | [`ResourceBitMap`](crate::ResourceBitMap) | [`ResourceAllocator`](crate::ResourceAllocator) | until the resource mark drops |
//! | [`CHeapBitMap`](crate::CHeapBitMap) | [`HeapAllocator`](crate::HeapAllocator) | until the bitmap drops |

use crate::bitmap::{calc_size_in_words, clear_range_of_words, max_size_in_bits, BitMap};
use crate::view::BitMapView;
use gc_core::{bit_in_word, bit_mask, words_align_down, words_align_up, AllocError, AllocResult, BITS_PER_WORD};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of backing words for a [`GrowableBitMap`].
pub trait BitMapAllocator {
    /// Handle to an allocated run of words. `Default` is the empty run.
    type Words: Deref<Target = [AtomicUsize]> + Default;

    /// Allocates `size_in_words` words with unspecified contents.
    fn allocate(&self, size_in_words: usize) -> AllocResult<Self::Words>;

    /// Returns words holding the first `min(old, new)` words of `old`.
    ///
    /// On success the caller passes `old` to [`BitMapAllocator::free`]. A
    /// policy that grows in place may return words aliasing `old`; such a
    /// policy must make `free` a no-op.
    fn reallocate(
        &self,
        old: &Self::Words,
        old_size_in_words: usize,
        new_size_in_words: usize,
    ) -> AllocResult<Self::Words> {
        let new_map = self.allocate(new_size_in_words)?;
        let copy = old_size_in_words.min(new_size_in_words);
        for (dst, src) in new_map[..copy].iter().zip(&old[..copy]) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }
        Ok(new_map)
    }

    /// Releases words obtained from this allocator.
    fn free(&self, words: Self::Words, size_in_words: usize);
}

/// A bitmap that owns its words and can be resized.
pub struct GrowableBitMap<A: BitMapAllocator> {
    allocator: A,
    map: A::Words,
    size: usize,
}

impl<A: BitMapAllocator> GrowableBitMap<A> {
    /// A zero-sized bitmap that will allocate from `allocator`.
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            allocator,
            map: A::Words::default(),
            size: 0,
        }
    }

    /// A bitmap of `size_in_bits` bits, cleared when `clear` is true.
    pub fn new_in(allocator: A, size_in_bits: usize, clear: bool) -> AllocResult<Self> {
        let mut bitmap = Self::with_allocator(allocator);
        bitmap.initialize(size_in_bits, clear)?;
        Ok(bitmap)
    }

    /// The storage policy.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// A view sharing this bitmap's words.
    pub fn as_view(&self) -> BitMapView<'_> {
        BitMapView::new(&self.map, self.size)
    }

    /// Allocates the initial words. The bitmap must be zero-sized.
    pub fn initialize(&mut self, size_in_bits: usize, clear: bool) -> AllocResult<()> {
        debug_assert!(
            self.map.is_empty() && self.size == 0,
            "precondition: bitmap already initialized"
        );
        self.resize(size_in_bits, clear)
    }

    /// Releases the current words and initializes a fresh map.
    pub fn reinitialize(&mut self, new_size_in_bits: usize, clear: bool) -> AllocResult<()> {
        // Free before allocating so arena-backed maps can reuse the space.
        self.resize(0, false)?;
        self.initialize(new_size_in_bits, clear)
    }

    /// Changes the size to `new_size_in_bits`.
    ///
    /// Bits below `min(old, new)` keep their values. When `clear` is true
    /// and the map grows, the new bits read as zero, including the stale
    /// tail of the old final partial word. On failure the bitmap is left
    /// unchanged.
    pub fn resize(&mut self, new_size_in_bits: usize, clear: bool) -> AllocResult<()> {
        if new_size_in_bits > max_size_in_bits() {
            return Err(AllocError::SizeOverflow {
                bits: new_size_in_bits,
                max: max_size_in_bits(),
            });
        }
        let old_size_in_bits = self.size;
        let old_size_in_words = calc_size_in_words(old_size_in_bits);
        let new_size_in_words = calc_size_in_words(new_size_in_bits);

        if new_size_in_words == 0 {
            let old = std::mem::take(&mut self.map);
            self.allocator.free(old, old_size_in_words);
            self.size = 0;
            return Ok(());
        }

        let new_map = self
            .allocator
            .reallocate(&self.map, old_size_in_words, new_size_in_words)?;
        if clear && new_size_in_bits > old_size_in_bits {
            // Bits of the old partial tail word beyond the old size are
            // stale; mask them before exposing them.
            let tail = &new_map[words_align_down(old_size_in_bits)];
            tail.store(
                tail.load(Ordering::Relaxed) & (bit_mask(old_size_in_bits) - 1),
                Ordering::Relaxed,
            );
            clear_range_of_words(&new_map, old_size_in_words, new_size_in_words);
        }
        let old = std::mem::replace(&mut self.map, new_map);
        self.allocator.free(old, old_size_in_words);
        self.size = new_size_in_bits;
        log::trace!(
            "resized bitmap {} -> {} bits ({} words)",
            old_size_in_bits,
            new_size_in_bits,
            new_size_in_words
        );
        Ok(())
    }

    /// Shrinks the bitmap to the bits in `[start_bit, end_bit)`.
    ///
    /// Afterwards bit `i` holds the old bit `start_bit + i`.
    pub fn truncate(&mut self, start_bit: usize, end_bit: usize) -> AllocResult<()> {
        self.verify_range(start_bit, end_bit);
        let old_size_in_words = self.size_in_words();
        let new_map = self.copy_of_range(start_bit, end_bit)?;
        let old = std::mem::replace(&mut self.map, new_map);
        self.allocator.free(old, old_size_in_words);
        self.size = end_bit - start_bit;
        Ok(())
    }

    /// Fresh words holding `[start_bit, end_bit)` shifted down to bit 0.
    fn copy_of_range(&self, start_bit: usize, end_bit: usize) -> AllocResult<A::Words> {
        let start_word = words_align_down(start_bit);
        let end_word = words_align_up(end_bit);
        let shift = bit_in_word(start_bit);
        let new_size_in_words = calc_size_in_words(end_bit - start_bit);
        let new_map = self.allocator.allocate(new_size_in_words)?;

        let old_map = &self.map;
        for (i, dst) in new_map[..new_size_in_words].iter().enumerate() {
            let src = start_word + i;
            let mut word = old_map[src].load(Ordering::Relaxed) >> shift;
            if shift != 0 && src + 1 < end_word {
                word |= old_map[src + 1].load(Ordering::Relaxed) << (BITS_PER_WORD - shift);
            }
            dst.store(word, Ordering::Relaxed);
        }
        Ok(new_map)
    }
}

impl<A: BitMapAllocator> BitMap for GrowableBitMap<A> {
    #[inline]
    fn map(&self) -> &[AtomicUsize] {
        &self.map
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }
}

impl<A: BitMapAllocator> Drop for GrowableBitMap<A> {
    fn drop(&mut self) {
        let words = calc_size_in_words(self.size);
        let map = std::mem::take(&mut self.map);
        self.allocator.free(map, words);
    }
}

impl<A: BitMapAllocator> fmt::Debug for GrowableBitMap<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowableBitMap")
            .field("size", &self.size)
            .field("words", &self.size_in_words())
            .field("set_bits", &self.count_one_bits())
            .finish()
    }
}
