//! Word geometry of bit-vector storage.
//!
//! A bitmap is an array of native machine words. Bit `i` lives in word
//! `i >> LOG_BITS_PER_WORD` at position `i & (BITS_PER_WORD - 1)`.

/// Element type of the words backing a bitmap.
pub type BmWord = usize;

/// Number of bits in a [`BmWord`].
pub const BITS_PER_WORD: usize = BmWord::BITS as usize;

/// Log2 of [`BITS_PER_WORD`], for shift-based division.
pub const LOG_BITS_PER_WORD: u32 = BITS_PER_WORD.trailing_zeros();

/// Number of bytes in a [`BmWord`].
pub const BYTES_PER_WORD: usize = std::mem::size_of::<BmWord>();

/// Returns the position of `bit` within the word containing it.
#[inline(always)]
pub const fn bit_in_word(bit: usize) -> usize {
    bit & (BITS_PER_WORD - 1)
}

/// Returns a mask selecting `bit` within the word containing it.
#[inline(always)]
pub const fn bit_mask(bit: usize) -> BmWord {
    1 << bit_in_word(bit)
}

/// Returns the index of the first bit of `word`.
#[inline(always)]
pub const fn bit_index(word: usize) -> usize {
    word << LOG_BITS_PER_WORD
}

/// Converts a bit offset to a word offset, rounding down.
#[inline(always)]
pub const fn words_align_down(bit: usize) -> usize {
    bit >> LOG_BITS_PER_WORD
}

/// Converts a bit offset to a word offset, rounding up.
///
/// `bit` must not be within `BITS_PER_WORD - 1` of `usize::MAX`; bitmap sizes
/// are capped well below that.
#[inline(always)]
pub const fn words_align_up(bit: usize) -> usize {
    words_align_down(bit + (BITS_PER_WORD - 1))
}
