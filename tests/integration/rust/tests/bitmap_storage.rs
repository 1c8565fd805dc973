//! Bitmap Storage Integration Tests
//!
//! Workers mark into thread-local scratch bitmaps carved from resource
//! areas and publish into a shared heap bitmap; the result is checked
//! against a sequentially built arena bitmap.

use bitmap::{
    ArenaBitMap, BitMap, BitMap2D, CHeapBitMap, HeapAllocator, MemTag, MemoryOrder, ResourceArea,
    ResourceBitMap, WordArena,
};
use code_roots::WorkerThreads;
use std::sync::atomic::{AtomicUsize, Ordering};

const BITS: usize = 10_000;
const WORKERS: usize = 4;
const REGION_BITS: usize = 512;

fn is_live(bit: usize) -> bool {
    bit % 7 == 3 || (4_000..4_300).contains(&bit)
}

/// Test: Thread-local scratch maps merge into the shared map exactly
#[test]
fn test_parallel_marking_via_scratch_maps() {
    let global = CHeapBitMap::new(BITS, MemTag::Gc, true).unwrap();
    let newly_marked = AtomicUsize::new(0);
    let workers = WorkerThreads::new("mark", WORKERS);

    workers.run_task(|worker_id| {
        let area = ResourceArea::new();
        let mark = area.mark();
        let scratch = ResourceBitMap::new(&mark, BITS, true).unwrap();
        // Overlapping stripes: every bit is claimed by two workers.
        let claimed = |b: &usize| {
            let stripe = b % WORKERS;
            stripe == worker_id || stripe == (worker_id + 1) % WORKERS
        };
        for bit in (0..BITS).filter(claimed).filter(|&b| is_live(b)) {
            scratch.set_bit(bit);
        }
        for bit in scratch.iter() {
            if global.par_set_bit(bit, MemoryOrder::Conservative) {
                newly_marked.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let arena = WordArena::new();
    let expected = ArenaBitMap::new(&arena, BITS, true).unwrap();
    for bit in (0..BITS).filter(|&b| is_live(b)) {
        expected.set_bit(bit);
    }

    assert!(global.is_same(&expected));
    assert_eq!(newly_marked.into_inner(), expected.count_one_bits());
}

/// Test: Per-region liveness summary in a 2D map over the mark bitmap
#[test]
fn test_region_summary_from_marks() {
    let marks = CHeapBitMap::new(BITS, MemTag::Gc, true).unwrap();
    marks.set_range(1_024, 2_048);
    marks.set_bit(5_000);

    // Slot per region: bit 0 = has live objects, bit 1 = fully live.
    let mut summary = BitMap2D::new(HeapAllocator::new(MemTag::Gc), 2);
    let regions = (BITS + REGION_BITS - 1) / REGION_BITS;
    for region in 0..regions {
        let beg = region * REGION_BITS;
        let end = (beg + REGION_BITS).min(BITS);
        let live = marks.count_one_bits_in(beg, end);
        summary.at_put_grow(region, 0, live > 0).unwrap();
        summary.at_put_grow(region, 1, live == end - beg).unwrap();
    }

    let has_live: Vec<usize> = (0..regions).filter(|&r| summary.at(r, 0)).collect();
    let full: Vec<usize> = (0..regions).filter(|&r| summary.at(r, 1)).collect();
    assert_eq!(has_live, vec![2, 3, 9]);
    assert_eq!(full, vec![2, 3]);
}
