//! Cursors and visitor types for walking the set bits of a bitmap.

use crate::bitmap::BitMap;
use std::iter::FusedIterator;

/// Return type accepted from an iteration function.
///
/// A function returning `()` always continues. A function returning `bool`
/// stops the iteration by returning `false`.
pub trait IterateResult {
    /// Whether iteration should continue after this call.
    fn keep_going(self) -> bool;
}

impl IterateResult for () {
    #[inline]
    fn keep_going(self) -> bool {
        true
    }
}

impl IterateResult for bool {
    #[inline]
    fn keep_going(self) -> bool {
        self
    }
}

/// Visitor object for [`BitMap::iterate_closure`].
pub trait BitMapClosure {
    /// Called with the index of each set bit. Return `false` to stop.
    fn do_bit(&mut self, index: usize) -> bool;
}

impl<F> BitMapClosure for F
where
    F: FnMut(usize) -> bool,
{
    fn do_bit(&mut self, index: usize) -> bool {
        self(index)
    }
}

/// Ascending cursor over the set bits of a range.
///
/// The cursor re-reads the bitmap on every step: bits set above the current
/// position after creation are seen, bits cleared ahead of it are skipped.
#[derive(Debug)]
pub struct BitMapIterator<'a, B: BitMap + ?Sized> {
    map: &'a B,
    cur_beg: usize,
    cur_end: usize,
}

impl<'a, B: BitMap + ?Sized> BitMapIterator<'a, B> {
    /// Cursor over the set bits in `[beg, end)`, positioned at the first one.
    pub fn new(map: &'a B, beg: usize, end: usize) -> Self {
        let cur_beg = map.find_first_set_bit(beg, end);
        Self {
            map,
            cur_beg,
            cur_end: end,
        }
    }

    /// True when no set bits remain.
    pub fn is_empty(&self) -> bool {
        self.cur_beg == self.cur_end
    }

    /// Current set bit. The cursor must not be empty.
    pub fn index(&self) -> usize {
        debug_assert!(!self.is_empty(), "empty iterator");
        self.cur_beg
    }

    /// Advances to the next set bit. The cursor must not be empty.
    pub fn step(&mut self) {
        debug_assert!(!self.is_empty(), "empty iterator");
        self.cur_beg = self.map.find_first_set_bit(self.cur_beg + 1, self.cur_end);
    }
}

impl<B: BitMap + ?Sized> Iterator for BitMapIterator<'_, B> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let index = self.cur_beg;
        self.step();
        Some(index)
    }
}

impl<B: BitMap + ?Sized> FusedIterator for BitMapIterator<'_, B> {}

/// Descending cursor over the set bits of a range.
#[derive(Debug)]
pub struct ReverseBitMapIterator<'a, B: BitMap + ?Sized> {
    map: &'a B,
    cur_beg: usize,
    // One past the current bit; equals cur_beg when exhausted.
    cur_end: usize,
}

impl<'a, B: BitMap + ?Sized> ReverseBitMapIterator<'a, B> {
    /// Cursor over the set bits in `[beg, end)`, positioned at the last one.
    pub fn new(map: &'a B, beg: usize, end: usize) -> Self {
        let last = map.find_last_set_bit(beg, end);
        let cur_end = if last == end { beg } else { last + 1 };
        Self {
            map,
            cur_beg: beg,
            cur_end,
        }
    }

    /// True when no set bits remain.
    pub fn is_empty(&self) -> bool {
        self.cur_beg == self.cur_end
    }

    /// Current set bit. The cursor must not be empty.
    pub fn index(&self) -> usize {
        debug_assert!(!self.is_empty(), "empty iterator");
        self.cur_end - 1
    }

    /// Moves to the next lower set bit. The cursor must not be empty.
    pub fn step(&mut self) {
        debug_assert!(!self.is_empty(), "empty iterator");
        let limit = self.cur_end - 1;
        let lastbit = self.map.find_last_set_bit(self.cur_beg, limit);
        self.cur_end = if lastbit == limit { self.cur_beg } else { lastbit + 1 };
    }
}

impl<B: BitMap + ?Sized> Iterator for ReverseBitMapIterator<'_, B> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let index = self.index();
        self.step();
        Some(index)
    }
}

impl<B: BitMap + ?Sized> FusedIterator for ReverseBitMapIterator<'_, B> {}
