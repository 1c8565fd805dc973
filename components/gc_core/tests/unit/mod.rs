//! Unit tests for the gc_core public surface.

use gc_core::{
    bit_index, bit_mask, guarantee, load_word_ordered, words_align_down, words_align_up,
    AllocError, AllocResult, MemoryOrder, BITS_PER_WORD,
};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_word_round_trip_through_bit_index() {
    for word in 0..8 {
        let bit = bit_index(word);
        assert_eq!(words_align_down(bit), word);
        assert_eq!(words_align_up(bit), word);
        assert_eq!(words_align_up(bit + 1), word + 1);
    }
}

#[test]
fn test_bit_mask_single_bit() {
    for bit in 0..(2 * BITS_PER_WORD) {
        assert_eq!(bit_mask(bit).count_ones(), 1);
    }
}

#[test]
fn test_cmpxchg_with_every_order() {
    for order in [
        MemoryOrder::Relaxed,
        MemoryOrder::Acquire,
        MemoryOrder::Release,
        MemoryOrder::AcqRel,
        MemoryOrder::Conservative,
    ] {
        let word = AtomicUsize::new(0);
        let (success, failure) = order.cmpxchg_orderings();
        assert_eq!(word.compare_exchange(0, 1, success, failure), Ok(0));
        assert_eq!(word.compare_exchange(0, 2, success, failure), Err(1));
        assert_eq!(load_word_ordered(&word, order), 1);
        word.fetch_or(0b10, order.rmw_ordering());
        assert_eq!(word.load(Ordering::Relaxed), 0b11);
    }
}

#[test]
fn test_alloc_result_propagates() {
    fn reserve(words: usize) -> AllocResult<usize> {
        if words > 4 {
            return Err(AllocError::OutOfMemory { words });
        }
        Ok(words)
    }

    fn outer() -> AllocResult<usize> {
        let a = reserve(2)?;
        let b = reserve(8)?;
        Ok(a + b)
    }

    assert_eq!(outer(), Err(AllocError::OutOfMemory { words: 8 }));
}

#[test]
#[should_panic(expected = "table still has 2 scans")]
fn test_guarantee_reports_formatted_message() {
    let scans = 2;
    guarantee!(scans == 0, "table still has {} scans", scans);
}
