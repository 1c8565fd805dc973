//! Bit-vector engine for collector metadata.
//!
//! This crate provides a dense bitmap over an array of machine words with
//! the operations a concurrent collector needs:
//!
//! - Single-bit get/set/clear, plain and atomic ([`BitMap::par_set_bit`])
//! - Range set/clear with word-granular fills and atomic boundary words
//! - Forward and backward search for set or clear bits
//! - Population count, set algebra, iteration with early stop
//!
//! # Flavours
//!
//! | Type | Owns words | Resizable |
//! |------|------------|-----------|
//! | [`BitMapView`] | no | no |
//! | [`ArenaBitMap`] | arena | yes |
//! | [`ResourceBitMap`] | resource mark | yes |
//! | [`CHeapBitMap`] | heap | yes |
//! | [`BitMap2D`] | any policy | yes |
//!
//! All flavours implement the [`BitMap`] trait.
//!
//! # Examples
//!
//! ```
//! use bitmap::{BitMap, CHeapBitMap, MemTag};
//! use gc_core::MemoryOrder;
//!
//! let marks = CHeapBitMap::new(1024, MemTag::Gc, true).unwrap();
//! assert!(marks.par_set_bit(40, MemoryOrder::Conservative));
//! assert!(!marks.par_set_bit(40, MemoryOrder::Conservative));
//! marks.set_range(100, 300);
//! assert_eq!(marks.count_one_bits(), 201);
//! assert_eq!(marks.find_first_set_bit(41, 1024), 100);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bitmap;
mod bitmap_2d;
mod growable;
mod iterator;
mod storage;
mod view;

pub use bitmap::{
    calc_size_in_words, max_size_in_bits, max_size_in_words, BitMap, RangeSizeHint,
    SMALL_RANGE_WORDS,
};
pub use bitmap_2d::BitMap2D;
pub use growable::{BitMapAllocator, GrowableBitMap};
pub use iterator::{BitMapClosure, BitMapIterator, IterateResult, ReverseBitMapIterator};
pub use storage::{
    ArenaAllocator, ArenaBitMap, CHeapBitMap, HeapAllocator, MemTag, ResourceAllocator,
    ResourceArea, ResourceBitMap, ResourceMark, WordArena,
};
pub use view::BitMapView;

// Re-export the shared word and ordering types for convenience
pub use gc_core::{AllocError, AllocResult, BmWord, MemoryOrder, BITS_PER_WORD};
