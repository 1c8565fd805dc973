//! Non-owning bitmap over caller-provided words.

use crate::bitmap::{calc_size_in_words, BitMap};
use std::fmt;
use std::sync::atomic::AtomicUsize;

/// A bitmap that borrows its backing words.
///
/// The view never allocates or frees. Its lifetime is bounded by the words
/// it borrows, so it cannot outlive them.
#[derive(Clone, Copy)]
pub struct BitMapView<'a> {
    map: &'a [AtomicUsize],
    size: usize,
}

impl<'a> BitMapView<'a> {
    /// Creates a view of `size_in_bits` bits over `map`.
    ///
    /// `map` must hold at least `calc_size_in_words(size_in_bits)` words.
    pub fn new(map: &'a [AtomicUsize], size_in_bits: usize) -> Self {
        debug_assert!(
            map.len() >= calc_size_in_words(size_in_bits),
            "view of {} bits needs more than {} words",
            size_in_bits,
            map.len()
        );
        Self {
            map,
            size: size_in_bits,
        }
    }

    /// A zero-sized view.
    pub const fn empty() -> Self {
        Self { map: &[], size: 0 }
    }

    /// The borrowed words with the view's lifetime.
    pub fn words(&self) -> &'a [AtomicUsize] {
        self.map
    }
}

impl Default for BitMapView<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl BitMap for BitMapView<'_> {
    #[inline]
    fn map(&self) -> &[AtomicUsize] {
        self.map
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }
}

impl fmt::Debug for BitMapView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitMapView")
            .field("size", &self.size)
            .field("set_bits", &self.count_one_bits())
            .finish()
    }
}
