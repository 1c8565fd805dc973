//! The bit-vector algorithm core.
//!
//! [`BitMap`] is implemented by every bitmap flavour in this crate. An
//! implementor only has to expose its backing words and its size in bits;
//! all operations are provided methods, so every storage variant shares one
//! statically dispatched implementation of the algorithms.
//!
//! # Plain vs. parallel access
//!
//! Words are stored as [`AtomicUsize`] so the same memory can serve both
//! access styles:
//!
//! - **Plain** operations (`at`, `set_bit`, `set_range`, set algebra, ...)
//!   read and write whole words with relaxed loads and stores. They are not
//!   read-modify-write atomic: the caller guarantees no other thread writes
//!   the same word concurrently.
//! - **Parallel** operations (`par_*`) use compare-and-swap or atomic
//!   `fetch_or`/`fetch_and` and may race freely with each other.
//!
//! Mixing the two styles on the same word concurrently loses updates.
//!
//! # Ranges
//!
//! Ranges are half-open `[beg, end)`. Range operations fill interior words
//! whole and mask the (at most two) boundary words, so their cost is
//! proportional to the number of words touched, not the number of bits.
//!
//! # Index checking
//!
//! Index and range preconditions are checked with `debug_assert!` only.
//! In release builds a violation that stays inside the backing words reads
//! or writes unspecified tail bits; one that leaves the backing words panics
//! on the slice bounds check.

use crate::iterator::{BitMapClosure, BitMapIterator, IterateResult, ReverseBitMapIterator};
use gc_core::{
    bit_in_word, bit_index, bit_mask, load_word_ordered, words_align_down, words_align_up, BmWord,
    MemoryOrder, BITS_PER_WORD, BYTES_PER_WORD,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Below this many full words a "large" range request takes the ordinary
/// range path.
pub const SMALL_RANGE_WORDS: usize = 32;

/// Word xor-ed into each loaded word when searching for set bits.
const FIND_ONES_FLIP: BmWord = 0;
/// Word xor-ed into each loaded word when searching for clear bits.
const FIND_ZEROS_FLIP: BmWord = !0;

/// Caller-supplied hint about the length of a range.
///
/// Only selects a code path; never changes the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeSizeHint {
    /// No information about the range.
    #[default]
    Unknown,
    /// The range is usually a single bit.
    Small,
    /// The range usually spans many words.
    Large,
}

/// Largest bitmap size, in words.
pub const fn max_size_in_words() -> usize {
    words_align_down(usize::MAX)
}

/// Largest bitmap size, in bits. Aligning this up to a word never overflows.
pub const fn max_size_in_bits() -> usize {
    max_size_in_words() * BITS_PER_WORD
}

/// Number of words needed to hold `size_in_bits` bits.
pub fn calc_size_in_words(size_in_bits: usize) -> usize {
    debug_assert!(
        size_in_bits <= max_size_in_bits(),
        "out of bounds: {}",
        size_in_bits
    );
    words_align_up(size_in_bits)
}

// =============================================================================
// Word-level helpers
// =============================================================================

#[inline(always)]
fn load(word: &AtomicUsize) -> BmWord {
    word.load(Ordering::Relaxed)
}

#[inline(always)]
fn store(word: &AtomicUsize, value: BmWord) {
    word.store(value, Ordering::Relaxed)
}

/// Mask with zeros at positions `[beg, end)` of a single word and ones elsewhere.
#[inline]
fn inverted_bit_mask_for_range(beg: usize, end: usize) -> BmWord {
    debug_assert!(end != 0, "does not work when end == 0");
    debug_assert!(
        beg == end || words_align_down(beg) == words_align_down(end - 1),
        "must be a single-word range"
    );
    let mut mask = bit_mask(beg) - 1;
    if bit_in_word(end) != 0 {
        mask |= !(bit_mask(end) - 1);
    }
    mask
}

fn set_range_within_word(map: &[AtomicUsize], beg: usize, end: usize) {
    if beg != end {
        let mask = inverted_bit_mask_for_range(beg, end);
        let word = &map[words_align_down(beg)];
        store(word, load(word) | !mask);
    }
}

fn clear_range_within_word(map: &[AtomicUsize], beg: usize, end: usize) {
    if beg != end {
        let mask = inverted_bit_mask_for_range(beg, end);
        let word = &map[words_align_down(beg)];
        store(word, load(word) & mask);
    }
}

fn par_put_range_within_word(map: &[AtomicUsize], beg: usize, end: usize, value: bool) {
    if beg != end {
        let mask = inverted_bit_mask_for_range(beg, end);
        let word = &map[words_align_down(beg)];
        let order = MemoryOrder::Conservative.rmw_ordering();
        if value {
            word.fetch_or(!mask, order);
        } else {
            word.fetch_and(mask, order);
        }
    }
}

fn fill_range_of_words(map: &[AtomicUsize], beg: usize, end: usize, value: BmWord) {
    for word in &map[beg..end] {
        store(word, value);
    }
}

pub(crate) fn clear_range_of_words(map: &[AtomicUsize], beg: usize, end: usize) {
    fill_range_of_words(map, beg, end, 0);
}

fn set_range_of_words(map: &[AtomicUsize], beg: usize, end: usize) {
    fill_range_of_words(map, beg, end, !0);
}

/// Bulk fill used by the large-range paths. Fills in fixed-size chunks so
/// the store loop stays tight for very long runs.
fn fill_large_range_of_words(map: &[AtomicUsize], beg: usize, end: usize, value: BmWord) {
    for chunk in map[beg..end].chunks(SMALL_RANGE_WORDS) {
        for word in chunk {
            store(word, value);
        }
    }
}

#[inline]
fn is_small_range_of_words(beg_full_word: usize, end_full_word: usize) -> bool {
    // beg_full_word > end_full_word happens when beg and end share a word.
    beg_full_word + SMALL_RANGE_WORDS >= end_full_word
}

fn count_one_bits_within_word(map: &[AtomicUsize], beg: usize, end: usize) -> usize {
    if beg != end {
        let mask = !inverted_bit_mask_for_range(beg, end);
        return (load(&map[words_align_down(beg)]) & mask).count_ones() as usize;
    }
    0
}

fn count_one_bits_in_range_of_words(map: &[AtomicUsize], beg: usize, end: usize) -> usize {
    map[beg..end]
        .iter()
        .map(|word| load(word).count_ones() as usize)
        .sum()
}

#[inline(always)]
fn log2_word(word: BmWord) -> usize {
    (BITS_PER_WORD - 1) - word.leading_zeros() as usize
}

/// Low `tail_bits` of a word.
#[inline]
fn tail_mask(tail_bits: usize) -> BmWord {
    debug_assert!(tail_bits != 0 && tail_bits < BITS_PER_WORD);
    (1 << tail_bits) - 1
}

/// `old_value` with its low `tail_bits` replaced by those of `new_value`.
#[inline]
fn merge_tail_of_map(new_value: BmWord, old_value: BmWord, tail_bits: usize) -> BmWord {
    let mask = tail_mask(tail_bits);
    (new_value & mask) | (old_value & !mask)
}

/// Applies `op` word-wise from `other` into `dest` for the first `size` bits,
/// preserving the bits of `dest` beyond `size`. Returns whether any in-range
/// bit of `dest` changed.
fn combine_maps<F>(dest: &[AtomicUsize], other: &[AtomicUsize], size: usize, op: F) -> bool
where
    F: Fn(BmWord, BmWord) -> BmWord,
{
    let limit = words_align_down(size);
    let mut changed = false;
    for (d, o) in dest[..limit].iter().zip(&other[..limit]) {
        let orig = load(d);
        let temp = op(orig, load(o));
        changed |= temp != orig;
        store(d, temp);
    }
    let rest = bit_in_word(size);
    if rest > 0 {
        let orig = load(&dest[limit]);
        let temp = merge_tail_of_map(op(orig, load(&other[limit])), orig, rest);
        changed |= temp != orig;
        store(&dest[limit], temp);
    }
    changed
}

/// Returns true if `pred` holds for every word pair, with the final partial
/// word compared through the tail mask.
fn all_words<F>(a: &[AtomicUsize], b: &[AtomicUsize], size: usize, pred: F) -> bool
where
    F: Fn(BmWord, BmWord, BmWord) -> bool,
{
    let limit = words_align_down(size);
    if !a[..limit]
        .iter()
        .zip(&b[..limit])
        .all(|(x, y)| pred(load(x), load(y), !0))
    {
        return false;
    }
    let rest = bit_in_word(size);
    rest == 0 || pred(load(&a[limit]), load(&b[limit]), tail_mask(rest))
}

fn find_first_bit_impl(
    map: &[AtomicUsize],
    flip: BmWord,
    aligned_right: bool,
    beg: usize,
    end: usize,
) -> usize {
    debug_assert!(!aligned_right || bit_in_word(end) == 0, "end not aligned");
    if beg >= end {
        return end;
    }

    // Word containing beg, with the bits below beg shifted out.
    let mut index = words_align_down(beg);
    let cword = (load(&map[index]) ^ flip) >> bit_in_word(beg);
    if cword & 1 != 0 {
        // The first bit is interesting often enough to test it before
        // paying for a trailing-zero count.
        return beg;
    }
    if cword != 0 {
        let result = beg + cword.trailing_zeros() as usize;
        if aligned_right || result < end {
            return result;
        }
    } else {
        let word_limit = if aligned_right {
            words_align_down(end)
        } else {
            words_align_up(end)
        };
        index += 1;
        while index < word_limit {
            let cword = load(&map[index]) ^ flip;
            if cword != 0 {
                let result = bit_index(index) + cword.trailing_zeros() as usize;
                if aligned_right || result < end {
                    return result;
                }
                debug_assert_eq!(index + 1, word_limit, "invariant");
                break;
            }
            index += 1;
        }
    }
    end
}

fn find_last_bit_impl(
    map: &[AtomicUsize],
    flip: BmWord,
    aligned_left: bool,
    beg: usize,
    end: usize,
) -> usize {
    debug_assert!(!aligned_left || bit_in_word(beg) == 0, "beg not aligned");
    if beg < end {
        let last_bit_index = end - 1;
        let mut index = words_align_down(last_bit_index);
        let mut cword = load(&map[index]) ^ flip;
        let last_bit_mask = bit_mask(last_bit_index);
        if cword & last_bit_mask != 0 {
            return last_bit_index;
        }
        // Keep only the bits below last_bit_index.
        cword &= last_bit_mask - 1;
        if cword != 0 {
            let result = bit_index(index) + log2_word(cword);
            if aligned_left || result >= beg {
                return result;
            }
        } else {
            let word_limit = words_align_down(beg);
            while index > word_limit {
                index -= 1;
                let cword = load(&map[index]) ^ flip;
                if cword != 0 {
                    let result = bit_index(index) + log2_word(cword);
                    if aligned_left || result >= beg {
                        return result;
                    }
                    debug_assert_eq!(index, word_limit, "invariant");
                    break;
                }
            }
        }
    }
    end
}

// =============================================================================
// BitMap
// =============================================================================

/// Operations on a bit-vector stored as an array of native words.
///
/// Bits are numbered from `0` to `size() - 1`. Implementors provide the
/// backing words and the size; all other methods are provided.
pub trait BitMap {
    /// The backing words. Must hold at least `calc_size_in_words(size())` words.
    fn map(&self) -> &[AtomicUsize];

    /// Size of the bitmap in bits.
    fn size(&self) -> usize;

    // =========================================================================
    // Accessing
    // =========================================================================

    /// Size of the bitmap in words.
    fn size_in_words(&self) -> usize {
        calc_size_in_words(self.size())
    }

    /// Size of the bitmap in bytes.
    fn size_in_bytes(&self) -> usize {
        self.size_in_words() * BYTES_PER_WORD
    }

    /// Debug check that `bit` is a valid index.
    #[inline(always)]
    fn verify_index(&self, bit: usize) {
        debug_assert!(
            bit < self.size(),
            "BitMap index out of bounds: {} >= {}",
            bit,
            self.size()
        );
    }

    /// Debug check that `bit` is a valid limit (may equal `size()`).
    #[inline(always)]
    fn verify_limit(&self, bit: usize) {
        debug_assert!(
            bit <= self.size(),
            "BitMap limit out of bounds: {} > {}",
            bit,
            self.size()
        );
    }

    /// Debug check that `[beg, end)` is a valid range.
    #[inline(always)]
    fn verify_range(&self, beg: usize, end: usize) {
        debug_assert!(beg <= end, "BitMap range error: {} > {}", beg, end);
        self.verify_limit(end);
    }

    /// The word containing `bit`.
    #[inline]
    fn word_addr(&self, bit: usize) -> &AtomicUsize {
        self.verify_limit(bit);
        &self.map()[words_align_down(bit)]
    }

    /// Returns the value of bit `index`.
    #[inline]
    fn at(&self, index: usize) -> bool {
        self.verify_index(index);
        load(self.word_addr(index)) & bit_mask(index) != 0
    }

    /// Returns the value of bit `index` with an ordered load.
    ///
    /// `order` must be [`MemoryOrder::Relaxed`] or [`MemoryOrder::Acquire`].
    #[inline]
    fn par_at(&self, index: usize, order: MemoryOrder) -> bool {
        self.verify_index(index);
        debug_assert!(
            matches!(order, MemoryOrder::Relaxed | MemoryOrder::Acquire),
            "unexpected memory ordering: {:?}",
            order
        );
        load_word_ordered(self.word_addr(index), order) & bit_mask(index) != 0
    }

    /// Sets bit `bit`. Not safe against concurrent writers of the same word.
    #[inline]
    fn set_bit(&self, bit: usize) {
        self.verify_index(bit);
        let word = self.word_addr(bit);
        store(word, load(word) | bit_mask(bit));
    }

    /// Clears bit `bit`. Not safe against concurrent writers of the same word.
    #[inline]
    fn clear_bit(&self, bit: usize) {
        self.verify_index(bit);
        let word = self.word_addr(bit);
        store(word, load(word) & !bit_mask(bit));
    }

    /// Sets or clears bit `bit`.
    fn at_put(&self, bit: usize, value: bool) {
        if value {
            self.set_bit(bit);
        } else {
            self.clear_bit(bit);
        }
    }

    /// Atomically sets bit `bit`.
    ///
    /// Returns `true` if this call changed the bit from clear to set. Of any
    /// number of racing callers on a clear bit exactly one observes `true`.
    /// A caller that finds the bit already set observes it with acquire
    /// semantics unless `order` is `Relaxed` or `Release`.
    #[inline]
    fn par_set_bit(&self, bit: usize, order: MemoryOrder) -> bool {
        self.verify_index(bit);
        let addr = self.word_addr(bit);
        let mask = bit_mask(bit);
        let (success, failure) = order.cmpxchg_orderings();
        let mut old_val = load_word_ordered(addr, order);
        loop {
            let new_val = old_val | mask;
            if new_val == old_val {
                // Someone else beat us to it.
                return false;
            }
            match addr.compare_exchange_weak(old_val, new_val, success, failure) {
                Ok(_) => return true,
                Err(cur_val) => old_val = cur_val,
            }
        }
    }

    /// Atomically clears bit `bit`. Returns `true` if this call made the change.
    #[inline]
    fn par_clear_bit(&self, bit: usize, order: MemoryOrder) -> bool {
        self.verify_index(bit);
        let addr = self.word_addr(bit);
        let mask = !bit_mask(bit);
        let (success, failure) = order.cmpxchg_orderings();
        let mut old_val = load_word_ordered(addr, order);
        loop {
            let new_val = old_val & mask;
            if new_val == old_val {
                return false;
            }
            match addr.compare_exchange_weak(old_val, new_val, success, failure) {
                Ok(_) => return true,
                Err(cur_val) => old_val = cur_val,
            }
        }
    }

    /// Atomically puts `value` at `bit` with conservative ordering.
    /// Returns `true` if this call changed the bit.
    fn par_at_put(&self, bit: usize, value: bool) -> bool {
        if value {
            self.par_set_bit(bit, MemoryOrder::Conservative)
        } else {
            self.par_clear_bit(bit, MemoryOrder::Conservative)
        }
    }

    // =========================================================================
    // Ranges
    // =========================================================================

    /// Sets the bits in `[beg, end)`.
    fn set_range(&self, beg: usize, end: usize) {
        self.verify_range(beg, end);
        let map = self.map();
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if beg_full_word < end_full_word {
            // At least one full word.
            set_range_within_word(map, beg, bit_index(beg_full_word));
            set_range_of_words(map, beg_full_word, end_full_word);
            set_range_within_word(map, bit_index(end_full_word), end);
        } else {
            // At most two partial words.
            let boundary = bit_index(beg_full_word).min(end);
            set_range_within_word(map, beg, boundary);
            set_range_within_word(map, boundary, end);
        }
    }

    /// Clears the bits in `[beg, end)`.
    fn clear_range(&self, beg: usize, end: usize) {
        self.verify_range(beg, end);
        let map = self.map();
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if beg_full_word < end_full_word {
            clear_range_within_word(map, beg, bit_index(beg_full_word));
            clear_range_of_words(map, beg_full_word, end_full_word);
            clear_range_within_word(map, bit_index(end_full_word), end);
        } else {
            let boundary = bit_index(beg_full_word).min(end);
            clear_range_within_word(map, beg, boundary);
            clear_range_within_word(map, boundary, end);
        }
    }

    /// Sets the bits in `[beg, end)`, expecting a range of many words.
    fn set_large_range(&self, beg: usize, end: usize) {
        self.verify_range(beg, end);
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if is_small_range_of_words(beg_full_word, end_full_word) {
            self.set_range(beg, end);
            return;
        }
        let map = self.map();
        set_range_within_word(map, beg, bit_index(beg_full_word));
        fill_large_range_of_words(map, beg_full_word, end_full_word, !0);
        set_range_within_word(map, bit_index(end_full_word), end);
    }

    /// Clears the bits in `[beg, end)`, expecting a range of many words.
    fn clear_large_range(&self, beg: usize, end: usize) {
        self.verify_range(beg, end);
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if is_small_range_of_words(beg_full_word, end_full_word) {
            self.clear_range(beg, end);
            return;
        }
        let map = self.map();
        clear_range_within_word(map, beg, bit_index(beg_full_word));
        fill_large_range_of_words(map, beg_full_word, end_full_word, 0);
        clear_range_within_word(map, bit_index(end_full_word), end);
    }

    /// Puts `value` into every bit of `[beg, end)`.
    fn at_put_range(&self, beg: usize, end: usize, value: bool) {
        if value {
            self.set_range(beg, end);
        } else {
            self.clear_range(beg, end);
        }
    }

    /// Large-range form of [`BitMap::at_put_range`].
    fn at_put_large_range(&self, beg: usize, end: usize, value: bool) {
        if value {
            self.set_large_range(beg, end);
        } else {
            self.clear_large_range(beg, end);
        }
    }

    /// Puts `value` into every bit of `[beg, end)`, touching the boundary
    /// words atomically.
    ///
    /// Bits outside the range are never disturbed, so threads may run this
    /// concurrently on disjoint ranges that share boundary words.
    fn par_at_put_range(&self, beg: usize, end: usize, value: bool) {
        self.verify_range(beg, end);
        let map = self.map();
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if beg_full_word < end_full_word {
            par_put_range_within_word(map, beg, bit_index(beg_full_word), value);
            fill_range_of_words(map, beg_full_word, end_full_word, if value { !0 } else { 0 });
            par_put_range_within_word(map, bit_index(end_full_word), end, value);
        } else {
            let boundary = bit_index(beg_full_word).min(end);
            par_put_range_within_word(map, beg, boundary, value);
            par_put_range_within_word(map, boundary, end, value);
        }
    }

    /// Large-range form of [`BitMap::par_at_put_range`].
    fn par_at_put_large_range(&self, beg: usize, end: usize, value: bool) {
        self.verify_range(beg, end);
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if is_small_range_of_words(beg_full_word, end_full_word) {
            self.par_at_put_range(beg, end, value);
            return;
        }
        let map = self.map();
        par_put_range_within_word(map, beg, bit_index(beg_full_word), value);
        fill_large_range_of_words(map, beg_full_word, end_full_word, if value { !0 } else { 0 });
        par_put_range_within_word(map, bit_index(end_full_word), end, value);
    }

    /// Sets `[beg, end)` using a size hint. A `Small` single-bit range is a
    /// single `set_bit`.
    fn set_range_hinted(&self, beg: usize, end: usize, hint: RangeSizeHint) {
        if hint == RangeSizeHint::Small && end == beg + 1 {
            self.set_bit(beg);
        } else if hint == RangeSizeHint::Large {
            self.set_large_range(beg, end);
        } else {
            self.set_range(beg, end);
        }
    }

    /// Clears `[beg, end)` using a size hint.
    fn clear_range_hinted(&self, beg: usize, end: usize, hint: RangeSizeHint) {
        if hint == RangeSizeHint::Small && end == beg + 1 {
            self.clear_bit(beg);
        } else if hint == RangeSizeHint::Large {
            self.clear_large_range(beg, end);
        } else {
            self.clear_range(beg, end);
        }
    }

    /// Atomically sets `[beg, end)` using a size hint.
    fn par_set_range(&self, beg: usize, end: usize, hint: RangeSizeHint) {
        if hint == RangeSizeHint::Small && end == beg + 1 {
            self.par_at_put(beg, true);
        } else if hint == RangeSizeHint::Large {
            self.par_at_put_large_range(beg, end, true);
        } else {
            self.par_at_put_range(beg, end, true);
        }
    }

    /// Atomically clears `[beg, end)` using a size hint.
    fn par_clear_range(&self, beg: usize, end: usize, hint: RangeSizeHint) {
        if hint == RangeSizeHint::Small && end == beg + 1 {
            self.par_at_put(beg, false);
        } else if hint == RangeSizeHint::Large {
            self.par_at_put_large_range(beg, end, false);
        } else {
            self.par_at_put_range(beg, end, false);
        }
    }

    /// Clears every word of the bitmap.
    fn clear(&self) {
        clear_range_of_words(self.map(), 0, self.size_in_words());
    }

    /// Clears every word of the bitmap using the bulk path.
    fn clear_large(&self) {
        fill_large_range_of_words(self.map(), 0, self.size_in_words(), 0);
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Applies `function` to the index of each set bit in `[beg, end)` in
    /// increasing order.
    ///
    /// `function` returns `()` or `bool`; returning `false` stops the
    /// iteration and makes this call return `false`. Bits the function sets
    /// above the current index are visited.
    fn iterate<F, R>(&self, mut function: F, beg: usize, end: usize) -> bool
    where
        F: FnMut(usize) -> R,
        R: IterateResult,
    {
        let mut index = beg;
        loop {
            index = self.find_first_set_bit(index, end);
            if index >= end {
                return true;
            }
            if !function(index).keep_going() {
                return false;
            }
            index += 1;
        }
    }

    /// [`BitMap::iterate`] over the whole bitmap.
    fn iterate_all<F, R>(&self, function: F) -> bool
    where
        F: FnMut(usize) -> R,
        R: IterateResult,
    {
        self.iterate(function, 0, self.size())
    }

    /// Applies `function` to the index of each set bit in `[beg, end)` in
    /// decreasing order. Stops early like [`BitMap::iterate`].
    fn reverse_iterate<F, R>(&self, mut function: F, beg: usize, end: usize) -> bool
    where
        F: FnMut(usize) -> R,
        R: IterateResult,
    {
        let mut limit = end;
        loop {
            let index = self.find_last_set_bit(beg, limit);
            if index == limit {
                return true;
            }
            if !function(index).keep_going() {
                return false;
            }
            limit = index;
        }
    }

    /// [`BitMap::reverse_iterate`] over the whole bitmap.
    fn reverse_iterate_all<F, R>(&self, function: F) -> bool
    where
        F: FnMut(usize) -> R,
        R: IterateResult,
    {
        self.reverse_iterate(function, 0, self.size())
    }

    /// Visits each set bit in `[beg, end)` with a closure object.
    fn iterate_closure<C>(&self, cl: &mut C, beg: usize, end: usize) -> bool
    where
        C: BitMapClosure + ?Sized,
    {
        self.iterate(|index| cl.do_bit(index), beg, end)
    }

    /// Visits each set bit in `[beg, end)` in decreasing order with a closure object.
    fn reverse_iterate_closure<C>(&self, cl: &mut C, beg: usize, end: usize) -> bool
    where
        C: BitMapClosure + ?Sized,
    {
        self.reverse_iterate(|index| cl.do_bit(index), beg, end)
    }

    /// Ascending cursor over the set bits of the whole bitmap.
    fn iter(&self) -> BitMapIterator<'_, Self> {
        BitMapIterator::new(self, 0, self.size())
    }

    /// Ascending cursor over the set bits in `[beg, end)`.
    fn iter_range(&self, beg: usize, end: usize) -> BitMapIterator<'_, Self> {
        BitMapIterator::new(self, beg, end)
    }

    /// Descending cursor over the set bits of the whole bitmap.
    fn reverse_iter(&self) -> ReverseBitMapIterator<'_, Self> {
        ReverseBitMapIterator::new(self, 0, self.size())
    }

    /// Descending cursor over the set bits in `[beg, end)`.
    fn reverse_iter_range(&self, beg: usize, end: usize) -> ReverseBitMapIterator<'_, Self> {
        ReverseBitMapIterator::new(self, beg, end)
    }

    // =========================================================================
    // Searching
    // =========================================================================

    /// Index of the first set bit in `[beg, end)`, or `end` if none.
    fn find_first_set_bit(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        find_first_bit_impl(self.map(), FIND_ONES_FLIP, false, beg, end)
    }

    /// Index of the first clear bit in `[beg, end)`, or `end` if none.
    fn find_first_clear_bit(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        find_first_bit_impl(self.map(), FIND_ZEROS_FLIP, false, beg, end)
    }

    /// Like [`BitMap::find_first_set_bit`], but `end` must be word aligned.
    fn find_first_set_bit_aligned_right(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        find_first_bit_impl(self.map(), FIND_ONES_FLIP, true, beg, end)
    }

    /// Index of the last set bit in `[beg, end)`, or `end` if none.
    fn find_last_set_bit(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        find_last_bit_impl(self.map(), FIND_ONES_FLIP, false, beg, end)
    }

    /// Index of the last clear bit in `[beg, end)`, or `end` if none.
    fn find_last_clear_bit(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        find_last_bit_impl(self.map(), FIND_ZEROS_FLIP, false, beg, end)
    }

    /// Like [`BitMap::find_last_set_bit`], but `beg` must be word aligned.
    fn find_last_set_bit_aligned_left(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        find_last_bit_impl(self.map(), FIND_ONES_FLIP, true, beg, end)
    }

    /// First set bit in `[beg, size())`.
    fn find_first_set_bit_from(&self, beg: usize) -> usize {
        self.find_first_set_bit(beg, self.size())
    }

    /// First clear bit in `[beg, size())`.
    fn find_first_clear_bit_from(&self, beg: usize) -> usize {
        self.find_first_clear_bit(beg, self.size())
    }

    /// Last set bit in `[beg, size())`.
    fn find_last_set_bit_from(&self, beg: usize) -> usize {
        self.find_last_set_bit(beg, self.size())
    }

    /// Last clear bit in `[beg, size())`.
    fn find_last_clear_bit_from(&self, beg: usize) -> usize {
        self.find_last_clear_bit(beg, self.size())
    }

    // =========================================================================
    // Counting
    // =========================================================================

    /// Number of set bits in the bitmap.
    fn count_one_bits(&self) -> usize {
        self.count_one_bits_in(0, self.size())
    }

    /// Number of set bits in `[beg, end)`.
    fn count_one_bits_in(&self, beg: usize, end: usize) -> usize {
        self.verify_range(beg, end);
        let map = self.map();
        let beg_full_word = words_align_up(beg);
        let end_full_word = words_align_down(end);
        if beg_full_word < end_full_word {
            count_one_bits_within_word(map, beg, bit_index(beg_full_word))
                + count_one_bits_in_range_of_words(map, beg_full_word, end_full_word)
                + count_one_bits_within_word(map, bit_index(end_full_word), end)
        } else {
            let boundary = bit_index(beg_full_word).min(end);
            count_one_bits_within_word(map, beg, boundary)
                + count_one_bits_within_word(map, boundary, end)
        }
    }

    // =========================================================================
    // Set operations
    // =========================================================================

    /// Debug check that `other` has the same size.
    fn verify_sizes<B: BitMap + ?Sized>(&self, other: &B) {
        debug_assert_eq!(self.size(), other.size(), "must have same size");
    }

    /// `self |= other`.
    fn set_union<B: BitMap + ?Sized>(&self, other: &B) {
        self.set_union_with_result(other);
    }

    /// `self &= !other`.
    fn set_difference<B: BitMap + ?Sized>(&self, other: &B) {
        self.set_difference_with_result(other);
    }

    /// `self &= other`.
    fn set_intersection<B: BitMap + ?Sized>(&self, other: &B) {
        self.set_intersection_with_result(other);
    }

    /// `self |= other`; returns whether `self` changed.
    fn set_union_with_result<B: BitMap + ?Sized>(&self, other: &B) -> bool {
        self.verify_sizes(other);
        combine_maps(self.map(), other.map(), self.size(), |d, o| d | o)
    }

    /// `self &= !other`; returns whether `self` changed.
    fn set_difference_with_result<B: BitMap + ?Sized>(&self, other: &B) -> bool {
        self.verify_sizes(other);
        combine_maps(self.map(), other.map(), self.size(), |d, o| d & !o)
    }

    /// `self &= other`; returns whether `self` changed.
    fn set_intersection_with_result<B: BitMap + ?Sized>(&self, other: &B) -> bool {
        self.verify_sizes(other);
        combine_maps(self.map(), other.map(), self.size(), |d, o| d & o)
    }

    /// Copies every bit of `other` into `self`.
    fn set_from<B: BitMap + ?Sized>(&self, other: &B) {
        self.verify_sizes(other);
        combine_maps(self.map(), other.map(), self.size(), |_, o| o);
    }

    /// True iff `self` is a superset of `other`.
    fn contains<B: BitMap + ?Sized>(&self, other: &B) -> bool {
        self.verify_sizes(other);
        all_words(self.map(), other.map(), self.size(), |d, o, m| (!d & o) & m == 0)
    }

    /// True iff `self` and `other` share at least one set bit.
    fn intersects<B: BitMap + ?Sized>(&self, other: &B) -> bool {
        self.verify_sizes(other);
        !all_words(self.map(), other.map(), self.size(), |d, o, m| (d & o) & m == 0)
    }

    /// True iff `self` and `other` hold the same bits.
    fn is_same<B: BitMap + ?Sized>(&self, other: &B) -> bool {
        self.verify_sizes(other);
        all_words(self.map(), other.map(), self.size(), |d, o, m| (d ^ o) & m == 0)
    }

    /// True iff every bit is set.
    fn is_full(&self) -> bool {
        let map = self.map();
        all_words(map, map, self.size(), |d, _, m| !d & m == 0)
    }

    /// True iff no bit is set.
    fn is_empty(&self) -> bool {
        let map = self.map();
        all_words(map, map, self.size(), |d, _, m| d & m == 0)
    }

    // =========================================================================
    // Copying and printing
    // =========================================================================

    /// Copies the words of the bitmap into `buffer`.
    ///
    /// `buffer` must hold at least `size_in_words()` words. Bits of the final
    /// word beyond `size()` are unspecified.
    fn write_to(&self, buffer: &mut [BmWord]) {
        let words = self.size_in_words();
        debug_assert!(buffer.len() >= words, "buffer too small");
        for (dst, src) in buffer.iter_mut().zip(&self.map()[..words]) {
            *dst = load(src);
        }
    }

    /// Prints the set runs as `prefix` followed by `[beg, end)` ranges.
    fn print_range_on<W: fmt::Write>(&self, out: &mut W, prefix: &str) -> fmt::Result {
        write!(out, "{}", prefix)?;
        let size = self.size();
        let mut start = self.find_first_set_bit(0, size);
        let mut first = true;
        while start < size {
            let end = self.find_first_clear_bit(start, size);
            if !first {
                write!(out, " ")?;
            }
            write!(out, "[{}, {})", start, end)?;
            first = false;
            start = self.find_first_set_bit(end, size);
        }
        writeln!(out)
    }

    /// Prints every bit, 64 per line, `S` for set and `.` for clear.
    fn print_on<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(out, "Bitmap ({} bits):", self.size())?;
        for index in 0..self.size() {
            if index % 64 == 0 {
                write!(out, "\n{:5}:", index)?;
            }
            if index % 8 == 0 {
                write!(out, " ")?;
            }
            write!(out, "{}", if self.at(index) { 'S' } else { '.' })?;
        }
        writeln!(out)
    }
}
