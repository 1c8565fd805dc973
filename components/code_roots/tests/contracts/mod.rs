//! Contract tests verifying the code_roots API surface.
//! These tests ensure all exported types and functions exist with the expected signatures.

use code_roots::{
    ArmedPhase, CodeRoots, CodeRootsConfig, NMethod, NMethodBarrier, NMethodTable, WorkerThreads,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Test CodeRootsConfig contract: default() enables barriers and unloading
#[test]
fn contract_config_default() {
    let config = CodeRootsConfig::default();
    assert!(config.nmethod_barrier);
    assert!(config.unload_classes);
    assert!(!config.continuations_enabled);
    assert!(config.use_nmethod_barriers_for_mark());
}

/// Test CodeRoots contract: new() -> empty registry, disarmed
#[test]
fn contract_code_roots_new() {
    let roots = CodeRoots::new();
    assert_eq!(roots.nmethods_count(), 0);
    assert_eq!(roots.armed_phase(), ArmedPhase::Disarmed);
    assert_eq!(roots.pending_purge(), 0);
    assert!(roots.use_nmethod_barriers_for_mark());
}

/// Test CodeRoots contract: register_nmethod(Arc<NMethod>) -> ()
#[test]
fn contract_register_nmethod() {
    let roots = CodeRoots::new();
    let nm = Arc::new(NMethod::with_oops(1, "m", vec![8]));
    roots.register_nmethod(Arc::clone(&nm));
    assert!(roots.contains(&nm));
    assert!(nm.is_registered());
    assert_eq!(roots.nmethods_count(), 1);
}

/// Test CodeRoots contract: unregister_nmethod(&NMethod) -> ()
#[test]
fn contract_unregister_nmethod() {
    let roots = CodeRoots::new();
    let nm = Arc::new(NMethod::new(1, "m"));
    roots.register_nmethod(Arc::clone(&nm));
    roots.unregister_nmethod(&nm);
    assert!(!roots.contains(&nm));
    assert!(!nm.is_registered());
}

/// Test CodeRoots contract: disarmed_value_address() aliases disarmed_value()
#[test]
fn contract_disarmed_value_address() {
    let roots = CodeRoots::new();
    roots.arm_for_evac();
    assert_eq!(
        roots.disarmed_value_address().load(Ordering::Acquire),
        roots.disarmed_value()
    );
}

/// Test CodeRoots contract: arm_for_mark() / disarm_nmethods() flip is_armed
#[test]
fn contract_arm_and_disarm() {
    let roots = CodeRoots::new();
    let nm = Arc::new(NMethod::new(1, "m"));
    roots.register_nmethod(Arc::clone(&nm));
    roots.arm_for_mark();
    assert!(roots.is_armed(&nm));
    roots.disarm_nmethods();
    assert!(!roots.is_armed(&nm));
}

/// Test CodeRoots contract: nmethod_entry_barrier(&NMethod, &impl NMethodBarrier) -> bool
#[test]
fn contract_entry_barrier_with_trait_object() {
    struct Counting(AtomicUsize);
    impl NMethodBarrier for Counting {
        fn heal_for_mark(&self, _nm: &NMethod) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        fn heal_for_evac(&self, _nm: &NMethod) {
            self.0.fetch_add(100, Ordering::Relaxed);
        }
    }

    let roots = CodeRoots::new();
    let nm = Arc::new(NMethod::new(1, "m"));
    roots.register_nmethod(Arc::clone(&nm));
    roots.arm_for_evac();
    let counting = Counting(AtomicUsize::new(0));
    let barrier: &dyn NMethodBarrier = &counting;
    assert!(roots.nmethod_entry_barrier(&nm, barrier));
    assert_eq!(counting.0.load(Ordering::Relaxed), 100);
}

/// Test CodeRoots contract: iterator() -> CodeRootsIterator with len()
#[test]
fn contract_iterator() {
    let roots = CodeRoots::new();
    for id in 0..5 {
        roots.register_nmethod(Arc::new(NMethod::new(id, "m")));
    }
    let iter = roots.iterator();
    assert_eq!(iter.len(), 5);
    let mut count = 0;
    iter.possibly_parallel_visit(|_| count += 1);
    assert_eq!(count, 5);
}

/// Test CodeRoots contract: unlink(Option<&WorkerThreads>, bool) -> usize, purge() -> usize
#[test]
fn contract_unlink_purge() {
    let roots = CodeRoots::new();
    let nm = Arc::new(NMethod::new(1, "m"));
    roots.register_nmethod(Arc::clone(&nm));
    nm.make_unloading();
    assert_eq!(roots.unlink(None, true), 1);
    assert!(nm.is_unlinked());
    assert_eq!(roots.purge(), 1);
    assert!(nm.is_purged());
}

/// Test NMethodTable contract: register() -> bool, snapshot() -> NMethodTableSnapshot
#[test]
fn contract_table_register_snapshot() {
    let table = NMethodTable::new(1, 1);
    let nm = Arc::new(NMethod::new(1, "m"));
    assert!(table.register(Arc::clone(&nm)));
    assert!(!table.register(Arc::clone(&nm)));
    let snapshot = table.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(table.iteration_in_progress());
}

/// Test NMethod contract: guard_address() aliases guard_value()
#[test]
fn contract_nmethod_guard() {
    let nm = NMethod::new(3, "m");
    assert_eq!(nm.id(), 3);
    assert_eq!(nm.name(), "m");
    assert_eq!(nm.guard_address().load(Ordering::Acquire), nm.guard_value());
}

/// Test WorkerThreads contract: new(name, max) -> all workers active
#[test]
fn contract_worker_threads_new() {
    let workers = WorkerThreads::new("gc", 3);
    assert_eq!(workers.name(), "gc");
    assert_eq!(workers.max_workers(), 3);
    assert_eq!(workers.active_workers(), 3);
    assert!(WorkerThreads::with_available_parallelism("gc").max_workers() >= 1);
}
