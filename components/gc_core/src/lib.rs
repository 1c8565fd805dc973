//! Shared building blocks for the concurrent collector primitives.
//!
//! This crate provides the pieces both the bitmap engine and the code-root
//! registry are written against:
//!
//! - [`BmWord`] and the word-geometry constants ([`BITS_PER_WORD`] and friends)
//! - [`MemoryOrder`] - the orderings accepted by the parallel bitmap accessors
//! - [`AllocError`] - the only recoverable failure (backing storage exhaustion)
//! - [`fatal`] and [`guarantee!`] - reporting of broken invariants
//!
//! # Examples
//!
//! ```
//! use gc_core::{words_align_up, MemoryOrder, BITS_PER_WORD};
//!
//! assert_eq!(words_align_up(BITS_PER_WORD + 1), 2);
//! assert!(MemoryOrder::Conservative.is_acquire());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod order;
mod word;

pub use error::{fatal, AllocError, AllocResult};
pub use order::{load_word_ordered, MemoryOrder};
pub use word::{
    bit_in_word, bit_index, bit_mask, words_align_down, words_align_up, BmWord, BITS_PER_WORD,
    BYTES_PER_WORD, LOG_BITS_PER_WORD,
};
