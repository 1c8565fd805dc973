//! Two-dimensional bitmap: a fixed number of bits per slot, laid out
//! slot-major in one growable bitmap.

use crate::bitmap::BitMap;
use crate::growable::{BitMapAllocator, GrowableBitMap};
use gc_core::{guarantee, AllocResult};
use std::fmt;

/// `bits_per_slot` bits for each slot index, backed by one [`GrowableBitMap`].
pub struct BitMap2D<A: BitMapAllocator> {
    map: GrowableBitMap<A>,
    bits_per_slot: usize,
}

impl<A: BitMapAllocator> BitMap2D<A> {
    /// An empty map with `bits_per_slot` bits per slot.
    pub fn new(allocator: A, bits_per_slot: usize) -> Self {
        guarantee!(bits_per_slot > 0, "BitMap2D needs at least one bit per slot");
        Self {
            map: GrowableBitMap::with_allocator(allocator),
            bits_per_slot,
        }
    }

    /// A cleared map with room for `size_in_slots` slots.
    pub fn with_slots(allocator: A, size_in_slots: usize, bits_per_slot: usize) -> AllocResult<Self> {
        let mut map = Self::new(allocator, bits_per_slot);
        map.map.initialize(size_in_slots * bits_per_slot, true)?;
        Ok(map)
    }

    /// Bits per slot.
    pub fn bits_per_slot(&self) -> usize {
        self.bits_per_slot
    }

    /// Total size in bits.
    pub fn size_in_bits(&self) -> usize {
        self.map.size()
    }

    /// Number of whole slots.
    pub fn size_in_slots(&self) -> usize {
        self.map.size() / self.bits_per_slot
    }

    /// The underlying one-dimensional bitmap.
    pub fn as_bitmap(&self) -> &GrowableBitMap<A> {
        &self.map
    }

    #[inline]
    fn bit_index(&self, slot_index: usize, bit_within_slot_index: usize) -> usize {
        debug_assert!(
            bit_within_slot_index < self.bits_per_slot,
            "index {} out of bounds for {} bits per slot",
            bit_within_slot_index,
            self.bits_per_slot
        );
        slot_index * self.bits_per_slot + bit_within_slot_index
    }

    /// True if `(slot_index, bit_within_slot_index)` lies inside the map.
    pub fn is_valid_index(&self, slot_index: usize, bit_within_slot_index: usize) -> bool {
        self.bit_index(slot_index, bit_within_slot_index) < self.map.size()
    }

    /// Value of one bit.
    pub fn at(&self, slot_index: usize, bit_within_slot_index: usize) -> bool {
        self.map.at(self.bit_index(slot_index, bit_within_slot_index))
    }

    /// Sets one bit.
    pub fn set_bit(&self, slot_index: usize, bit_within_slot_index: usize) {
        self.map.set_bit(self.bit_index(slot_index, bit_within_slot_index))
    }

    /// Clears one bit.
    pub fn clear_bit(&self, slot_index: usize, bit_within_slot_index: usize) {
        self.map.clear_bit(self.bit_index(slot_index, bit_within_slot_index))
    }

    /// Puts `value` into one bit.
    pub fn at_put(&self, slot_index: usize, bit_within_slot_index: usize, value: bool) {
        self.map
            .at_put(self.bit_index(slot_index, bit_within_slot_index), value)
    }

    /// Puts `value` into one bit, doubling the map until the slot fits.
    pub fn at_put_grow(
        &mut self,
        slot_index: usize,
        bit_within_slot_index: usize,
        value: bool,
    ) -> AllocResult<()> {
        let bit = self.bit_index(slot_index, bit_within_slot_index);
        let size = self.map.size();
        if bit >= size {
            let mut new_size = size.max(self.bits_per_slot);
            while bit >= new_size {
                new_size *= 2;
            }
            self.map.resize(new_size, true)?;
        }
        self.map.at_put(bit, value);
        Ok(())
    }

    /// Clears every bit.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<A: BitMapAllocator> fmt::Debug for BitMap2D<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitMap2D")
            .field("bits_per_slot", &self.bits_per_slot)
            .field("size_in_slots", &self.size_in_slots())
            .finish()
    }
}
