//! Contract tests verifying the bitmap API surface.
//! These tests ensure all exported types and functions exist with the expected signatures.

use bitmap::{
    calc_size_in_words, max_size_in_bits, AllocError, ArenaAllocator, ArenaBitMap, BitMap,
    BitMapAllocator, BitMapClosure, BitMapView, CHeapBitMap, GrowableBitMap, HeapAllocator,
    MemTag, MemoryOrder, ResourceArea, ResourceBitMap, WordArena, BITS_PER_WORD,
};
use std::sync::atomic::AtomicUsize;

/// Test calc_size_in_words contract: (bits) -> words, rounding up
#[test]
fn contract_calc_size_in_words() {
    assert_eq!(calc_size_in_words(0), 0);
    assert_eq!(calc_size_in_words(1), 1);
    assert_eq!(calc_size_in_words(BITS_PER_WORD), 1);
    assert_eq!(calc_size_in_words(BITS_PER_WORD + 1), 2);
}

/// Test BitMapView contract: new(&[AtomicUsize], bits) -> BitMapView
#[test]
fn contract_view_new() {
    let words: Vec<AtomicUsize> = (0..2).map(|_| AtomicUsize::new(0)).collect();
    let view = BitMapView::new(&words, 100);
    assert_eq!(view.size(), 100);
    assert_eq!(view.size_in_words(), 2);
    assert_eq!(view.size_in_bytes(), 2 * std::mem::size_of::<usize>());
}

/// Test CHeapBitMap contract: new(bits, tag, clear) -> AllocResult<CHeapBitMap>
#[test]
fn contract_cheap_new() {
    let bm = CHeapBitMap::new(10, MemTag::Gc, true).unwrap();
    assert_eq!(bm.size(), 10);
    assert_eq!(bm.allocator().tag(), MemTag::Gc);
}

/// Test GrowableBitMap contract: resize past the maximum -> SizeOverflow
#[test]
fn contract_resize_overflow() {
    let mut bm = CHeapBitMap::with_tag(MemTag::Gc);
    let result = bm.resize(max_size_in_bits() + 1, true);
    assert_eq!(
        result,
        Err(AllocError::SizeOverflow {
            bits: max_size_in_bits() + 1,
            max: max_size_in_bits(),
        })
    );
}

/// Test ArenaBitMap contract: new(&WordArena, bits, clear) -> AllocResult<ArenaBitMap>
#[test]
fn contract_arena_new() {
    let arena = WordArena::new();
    let bm = ArenaBitMap::new(&arena, 65, true).unwrap();
    assert_eq!(bm.size_in_words(), 2);
    assert_eq!(arena.used_words(), 2);
}

/// Test ResourceBitMap contract: new(&ResourceMark, bits, clear) -> AllocResult<ResourceBitMap>
#[test]
fn contract_resource_new() {
    let area = ResourceArea::new();
    let rm = area.mark();
    let bm = ResourceBitMap::new(&rm, 1, true).unwrap();
    assert!(!bm.at(0));
}

/// Test BitMapAllocator contract: a custom policy plugs into GrowableBitMap
#[test]
fn contract_custom_allocator() {
    #[derive(Default)]
    struct Counting(std::cell::Cell<usize>);

    impl BitMapAllocator for &Counting {
        type Words = Vec<AtomicUsize>;

        fn allocate(&self, size_in_words: usize) -> bitmap::AllocResult<Self::Words> {
            self.0.set(self.0.get() + 1);
            Ok((0..size_in_words).map(|_| AtomicUsize::new(0)).collect())
        }

        fn free(&self, _words: Self::Words, _size_in_words: usize) {}
    }

    let counting = Counting::default();
    let mut bm = GrowableBitMap::new_in(&counting, 64, true).unwrap();
    bm.resize(256, true).unwrap();
    bm.set_bit(255);
    assert_eq!(counting.0.get(), 2);
    assert_eq!(bm.count_one_bits(), 1);
}

/// Test BitMap contract: par_set_bit(bit, order) -> bool
#[test]
fn contract_par_set_bit() {
    let bm = CHeapBitMap::new(8, MemTag::Gc, true).unwrap();
    for order in [MemoryOrder::Relaxed, MemoryOrder::Release, MemoryOrder::Conservative] {
        bm.clear();
        assert!(bm.par_set_bit(3, order));
        assert!(!bm.par_set_bit(3, order));
    }
}

/// Test BitMapClosure contract: closures returning bool are closure objects
#[test]
fn contract_closure_object() {
    let bm = CHeapBitMap::new(8, MemTag::Gc, true).unwrap();
    bm.set_range(2, 5);
    let mut count = 0;
    let mut cl = |_: usize| {
        count += 1;
        true
    };
    assert!(bm.iterate_closure(&mut cl, 0, 8));
    assert_eq!(count, 3);
    fn takes_closure<C: BitMapClosure>(_: &C) {}
    takes_closure(&|_: usize| false);
}

/// Test ArenaAllocator contract: is a copyable handle to the arena
#[test]
fn contract_arena_allocator_copy() {
    let arena = WordArena::new();
    let alloc = ArenaAllocator::new(&arena);
    let copy = alloc;
    let _a = alloc.allocate(1).unwrap();
    let _b = copy.allocate(1).unwrap();
    assert_eq!(arena.used_words(), 2);
}

/// Test HeapAllocator contract: Words is an owned boxed slice
#[test]
fn contract_heap_allocator_words() {
    let alloc = HeapAllocator::new(MemTag::Code);
    let words: Box<[AtomicUsize]> = alloc.allocate(3).unwrap();
    assert_eq!(words.len(), 3);
    alloc.free(words, 3);
}
