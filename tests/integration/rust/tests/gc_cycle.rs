//! Collector Cycle Integration Tests
//!
//! Drives a mark bitmap and the code-root registry through a full cycle:
//! arm for mark, heal through entry barriers while workers scan the roots,
//! disarm, evacuate, then unlink and purge unloaded code.

use bitmap::{BitMap, CHeapBitMap, MemTag, MemoryOrder};
use code_roots::{ArmedPhase, CodeRoots, NMethod, WorkerThreads};
use integration_tests::{mark_index, HEAP_WORD_SIZE};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const HEAP_BYTES: usize = 1 << 16;
const FORWARD_OFFSET: usize = HEAP_BYTES / 2;

/// Nmethods embedding a few addresses each in the lower half of the heap.
fn compiled_methods(count: u64) -> Vec<Arc<NMethod>> {
    (0..count)
        .map(|id| {
            let base = (id as usize * 3 * HEAP_WORD_SIZE) % FORWARD_OFFSET;
            let oops = vec![base, base + HEAP_WORD_SIZE, (base * 7) % FORWARD_OFFSET];
            Arc::new(NMethod::with_oops(id, format!("method{}", id), oops))
        })
        .collect()
}

fn embedded_marks(methods: &[Arc<NMethod>]) -> BTreeSet<usize> {
    methods
        .iter()
        .flat_map(|nm| nm.oops())
        .map(mark_index)
        .collect()
}

/// Test: Barrier heals and parallel root scanning mark every embedded oop
#[test]
fn test_concurrent_mark_through_code_roots() {
    let roots = CodeRoots::new();
    let methods = compiled_methods(500);
    for nm in &methods {
        roots.register_nmethod(Arc::clone(nm));
    }
    let marks = CHeapBitMap::new(HEAP_BYTES / HEAP_WORD_SIZE, MemTag::Gc, true).unwrap();
    let heals = AtomicUsize::new(0);
    let mark_oops = |nm: &NMethod| {
        nm.oops_do(|oop| {
            marks.par_set_bit(mark_index(*oop), MemoryOrder::Relaxed);
        });
    };
    let barrier = |phase: ArmedPhase, nm: &NMethod| {
        assert_eq!(phase, ArmedPhase::Mark);
        heals.fetch_add(1, Ordering::Relaxed);
        mark_oops(nm);
    };

    roots.arm_for_mark();
    assert!(methods.iter().all(|nm| roots.is_armed(nm)));

    let workers = WorkerThreads::new("conc-mark", 4);
    let scan = roots.iterator();
    crossbeam::scope(|s| {
        // Mutators entering compiled code.
        for t in 0..3 {
            let methods = &methods;
            let roots = &roots;
            let barrier = &barrier;
            s.spawn(move |_| {
                for nm in methods.iter().skip(t).step_by(2) {
                    assert!(roots.nmethod_entry_barrier(nm, barrier));
                }
            });
        }
        // Collector workers scanning the code roots.
        workers.run_task(|_| scan.possibly_parallel_visit(|nm| mark_oops(nm.as_ref())));
    })
    .unwrap();
    drop(scan);

    let expected = embedded_marks(&methods);
    assert_eq!(marks.count_one_bits(), expected.len());
    let marked: BTreeSet<usize> = marks.iter().collect();
    assert_eq!(marked, expected);
    // Every nmethod was entered while armed and healed exactly once.
    assert_eq!(heals.load(Ordering::Relaxed), methods.len());

    roots.disarm_nmethods();
    assert!(methods.iter().all(|nm| !roots.is_armed(nm)));
    assert_eq!(roots.armed_phase(), ArmedPhase::Disarmed);
}

/// Test: Evacuation heals forward each nmethod's oops exactly once
#[test]
fn test_evacuation_forwards_once() {
    let roots = CodeRoots::new();
    let methods = compiled_methods(64);
    for nm in &methods {
        roots.register_nmethod(Arc::clone(nm));
    }
    let before: Vec<Vec<usize>> = methods.iter().map(|nm| nm.oops()).collect();
    let barrier = |phase: ArmedPhase, nm: &NMethod| {
        assert_eq!(phase, ArmedPhase::Evac);
        nm.oops_do(|oop| *oop += FORWARD_OFFSET);
    };

    roots.arm_for_evac();
    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for nm in &methods {
                    assert!(roots.nmethod_entry_barrier(nm, &barrier));
                }
            });
        }
    })
    .unwrap();
    roots.disarm_nmethods();

    for (nm, old) in methods.iter().zip(&before) {
        let forwarded: Vec<usize> = old.iter().map(|oop| oop + FORWARD_OFFSET).collect();
        assert_eq!(nm.oops(), forwarded, "nmethod {} healed wrongly", nm.id());
    }
}

/// Test: Unloaded code is unlinked in parallel, purged, and its marks cleared
#[test]
fn test_unloading_cycle() {
    let roots = CodeRoots::new();
    let methods = compiled_methods(300);
    for nm in &methods {
        roots.register_nmethod(Arc::clone(nm));
    }
    for pair in methods.windows(2) {
        pair[0].add_inline_cache(&pair[1]);
    }

    roots.arm_for_mark();
    let marks = CHeapBitMap::new(HEAP_BYTES / HEAP_WORD_SIZE, MemTag::Gc, true).unwrap();
    {
        let scan = roots.iterator();
        scan.possibly_parallel_visit(|nm| {
            nm.oops_do(|oop| marks.set_bit(mark_index(*oop)));
        });
    }
    roots.disarm_nmethods();

    let (dying, surviving): (Vec<_>, Vec<_>) =
        methods.iter().cloned().partition(|nm| nm.id() % 5 == 0);
    for nm in &dying {
        nm.make_unloading();
    }

    let workers = WorkerThreads::new("unlink", 3);
    assert_eq!(roots.unlink(Some(&workers), true), dying.len());
    assert_eq!(roots.nmethods_count(), surviving.len());

    // Every surviving caller of a dying nmethod lost that inline cache.
    for nm in &surviving {
        assert!(nm.inline_cache_targets().iter().all(|t| !t.is_unloading()));
    }

    // Rebuild marks from the surviving roots only.
    marks.clear();
    let scan = roots.iterator();
    scan.possibly_parallel_visit(|nm| {
        nm.oops_do(|oop| marks.set_bit(mark_index(*oop)));
    });
    drop(scan);
    assert_eq!(marks.count_one_bits(), embedded_marks(&surviving).len());

    assert_eq!(roots.purge(), dying.len());
    assert!(dying.iter().all(|nm| nm.is_purged() && !nm.is_registered()));
    assert!(surviving.iter().all(|nm| roots.contains(nm) && !nm.is_unlinked()));
}

/// Test: Unloading nmethods refuse entry while armed
#[test]
fn test_unloading_nmethod_forces_deoptimization() {
    let roots = CodeRoots::new();
    let methods = compiled_methods(2);
    for nm in &methods {
        roots.register_nmethod(Arc::clone(nm));
    }
    roots.arm_for_mark();
    methods[1].make_unloading();
    let barrier = |_: ArmedPhase, _: &NMethod| {};
    assert!(roots.nmethod_entry_barrier(&methods[0], &barrier));
    assert!(!roots.nmethod_entry_barrier(&methods[1], &barrier));
    roots.disarm_nmethods();
}
