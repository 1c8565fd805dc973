//! Code-root registry and the nmethod barrier arm/disarm protocol.
//!
//! # Stamps
//!
//! Each nmethod carries a raw guard stamp. Compiled entry code compares it
//! with the live *disarmed value*; on a match the entry proceeds, on a
//! mismatch it calls [`CodeRoots::nmethod_entry_barrier`].
//!
//! The collector interprets an nmethod's stamp as `max(raw, floor)`, where
//! the *floor* is raised by [`CodeRoots::disarm_nmethods`]:
//!
//! - `arm_for_mark` / `arm_for_evac` bump the disarmed value. Every stamp is
//!   now stale, so every nmethod is armed.
//! - `disarm_nmethods` bumps the disarmed value and raises the floor to it.
//!   Every stamp now reads as current without touching any nmethod.
//! - The entry slow path takes a consistent (value, phase) pair under the
//!   entry lock, runs that phase's [`NMethodBarrier`] action if the stamp is
//!   older than the value, and writes the captured value into the raw stamp.
//!   An arm that lands during the action leaves the nmethod armed.
//!
//! The counter is 64 bits wide and only ever incremented, so it does not
//! wrap in practice.
//!
//! # Phase driver
//!
//! ```
//! use code_roots::{CodeRoots, NMethod};
//! use std::sync::Arc;
//!
//! let roots = CodeRoots::default();
//! let nm = Arc::new(NMethod::new(1, "foo"));
//! roots.register_nmethod(Arc::clone(&nm));
//!
//! roots.arm_for_mark();
//! assert!(roots.is_armed(&nm));
//! roots.disarm_nmethods();
//! assert!(!roots.is_armed(&nm));
//! ```

use crate::barrier::{ArmedPhase, NMethodBarrier};
use crate::config::CodeRootsConfig;
use crate::nmethod::NMethod;
use crate::table::{NMethodTable, NMethodTableSnapshot};
use crate::workers::WorkerThreads;
use crossbeam::atomic::AtomicCell;
use crossbeam::queue::SegQueue;
use crossbeam::utils::CachePadded;
use crossbeam_epoch as epoch;
use gc_core::guarantee;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Initial disarmed value. Raw stamps start at zero, below it.
const INITIAL_DISARMED_VALUE: u64 = 1;

/// Registry of compiled code that may embed object references.
pub struct CodeRoots {
    table: NMethodTable,
    /// Live disarmed value read by compiled entry code
    disarmed: CachePadded<AtomicU64>,
    /// Lowest stamp any nmethod can have, raised by disarm
    floor: AtomicU64,
    armed: AtomicCell<ArmedPhase>,
    /// Unlinked nmethods waiting for purge
    unlinked: SegQueue<Arc<NMethod>>,
    config: CodeRootsConfig,
}

impl CodeRoots {
    /// Creates a registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(CodeRootsConfig::default())
    }

    /// Creates a registry with a custom configuration.
    pub fn with_config(config: CodeRootsConfig) -> Self {
        CodeRoots {
            table: NMethodTable::new(config.initial_capacity, config.claim_stride),
            disarmed: CachePadded::new(AtomicU64::new(INITIAL_DISARMED_VALUE)),
            floor: AtomicU64::new(INITIAL_DISARMED_VALUE),
            armed: AtomicCell::new(ArmedPhase::Disarmed),
            unlinked: SegQueue::new(),
            config,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &CodeRootsConfig {
        &self.config
    }

    /// Whether marking relies on nmethod entry barriers.
    pub fn use_nmethod_barriers_for_mark(&self) -> bool {
        self.config.use_nmethod_barriers_for_mark()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a newly installed nmethod, or refreshes it if already
    /// registered. The nmethod starts disarmed.
    pub fn register_nmethod(&self, nm: Arc<NMethod>) {
        self.table.register(Arc::clone(&nm));
        self.disarm(&nm);
    }

    /// Unregisters an invalidated nmethod. Fatal if it is not registered.
    pub fn unregister_nmethod(&self, nm: &NMethod) {
        self.table.unregister(nm);
    }

    /// Number of registered nmethods.
    pub fn nmethods_count(&self) -> usize {
        self.table.len()
    }

    /// Whether `nm` is registered here.
    pub fn contains(&self, nm: &NMethod) -> bool {
        self.table.contains(nm)
    }

    /// The underlying table.
    pub fn table(&self) -> &NMethodTable {
        &self.table
    }

    /// O(1) snapshot of the registered nmethods.
    pub fn iterator(&self) -> CodeRootsIterator<'_> {
        CodeRootsIterator {
            snapshot: self.table.snapshot(),
        }
    }

    // =========================================================================
    // Arm / disarm
    // =========================================================================

    /// The live disarmed value.
    #[inline]
    pub fn disarmed_value(&self) -> u64 {
        self.disarmed.load(Ordering::Acquire)
    }

    /// Address of the live disarmed value, for compiled entry code to
    /// compare against inline.
    pub fn disarmed_value_address(&self) -> &AtomicU64 {
        &self.disarmed
    }

    /// The phase the barriers are armed for.
    pub fn armed_phase(&self) -> ArmedPhase {
        self.armed.load()
    }

    /// Arms every nmethod before concurrent marking.
    ///
    /// Fatal if barriers are not used for marking or marking is already armed.
    pub fn arm_for_mark(&self) {
        guarantee!(
            self.use_nmethod_barriers_for_mark(),
            "arming nmethods for mark without nmethod barriers for mark"
        );
        self.arm(ArmedPhase::Mark);
    }

    /// Arms every nmethod before concurrent evacuation.
    ///
    /// Fatal if evacuation is already armed.
    pub fn arm_for_evac(&self) {
        self.arm(ArmedPhase::Evac);
    }

    fn arm(&self, phase: ArmedPhase) {
        // The phase is published before the value, so a reader that sees the
        // new value also sees the new phase.
        let previous = self.armed.swap(phase);
        guarantee!(
            previous != phase,
            "nmethods already armed for {:?}",
            phase
        );
        let value = self.disarmed.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "armed nmethods for {:?} (was {:?}), disarmed value {}",
            phase,
            previous,
            value
        );
    }

    /// Disarms every nmethod in O(1).
    pub fn disarm_nmethods(&self) {
        self.armed.store(ArmedPhase::Disarmed);
        let value = self.disarmed.fetch_add(1, Ordering::AcqRel) + 1;
        // The floor only rises, and never past a racing arm's value.
        self.floor.fetch_max(value, Ordering::AcqRel);
        log::debug!(
            "disarmed {} nmethods, disarmed value {}",
            self.table.len(),
            value
        );
    }

    /// Stamp of `nm` as the collector interprets it.
    pub fn stamp_of(&self, nm: &NMethod) -> u64 {
        nm.guard_value().max(self.floor.load(Ordering::Acquire))
    }

    /// Whether entering `nm` must run the barrier action first.
    pub fn is_armed(&self, nm: &NMethod) -> bool {
        self.stamp_of(nm) != self.disarmed_value()
    }

    fn disarm(&self, nm: &NMethod) {
        nm.set_guard_value(self.disarmed_value());
    }

    /// The disarmed value together with the phase armed for it.
    fn armed_state(&self) -> (u64, ArmedPhase) {
        loop {
            let value = self.disarmed.load(Ordering::Acquire);
            let phase = self.armed.load();
            if self.disarmed.load(Ordering::Acquire) == value {
                return (value, phase);
            }
        }
    }

    // =========================================================================
    // Entry barrier
    // =========================================================================

    /// Entry barrier for `nm`.
    ///
    /// Returns true if the caller may enter the code, false if `nm` is
    /// unloading (or no longer registered) and the caller must deoptimize.
    pub fn nmethod_entry_barrier<B>(&self, nm: &NMethod, barrier: &B) -> bool
    where
        B: NMethodBarrier + ?Sized,
    {
        if !self.config.nmethod_barrier {
            return true;
        }
        // The check compiled entry code does inline.
        if nm.guard_value() == self.disarmed_value() {
            return true;
        }
        self.nmethod_entry_barrier_slow(nm, barrier)
    }

    #[cold]
    fn nmethod_entry_barrier_slow<B>(&self, nm: &NMethod, barrier: &B) -> bool
    where
        B: NMethodBarrier + ?Sized,
    {
        let guard = &epoch::pin();
        let entry = nm.gc_data.load(Ordering::Acquire, guard);
        // SAFETY: entries are destroyed through the epoch collector and we
        // hold `guard`.
        let Some(entry) = (unsafe { entry.as_ref() }) else {
            return false;
        };
        let _locker = entry.lock();

        // Stamp the captured value, never the live one: an arm during the
        // action must not be absorbed.
        let (value, phase) = self.armed_state();
        if self.stamp_of(nm) >= value {
            // Disarmed since the fast check, or another thread healed it.
            nm.set_guard_value(value.max(nm.guard_value()));
            return true;
        }
        if nm.is_unloading() {
            return false;
        }
        match phase {
            ArmedPhase::Mark => barrier.heal_for_mark(nm),
            ArmedPhase::Evac => barrier.heal_for_evac(nm),
            ArmedPhase::Disarmed => {}
        }
        nm.set_guard_value(value);
        true
    }

    // =========================================================================
    // Unloading
    // =========================================================================

    /// Sweeps the registry after class unloading.
    ///
    /// Unloading nmethods are unlinked, unregistered and queued for
    /// [`purge`](Self::purge). When `unloading_occurred` is set, surviving
    /// nmethods drop inline-cache targets that are unloading. With no
    /// workers the sweep runs on the caller. Returns the number unlinked.
    pub fn unlink(&self, workers: Option<&WorkerThreads>, unloading_occurred: bool) -> usize {
        let snapshot = self.table.snapshot();
        let unlinked = AtomicUsize::new(0);
        let cleaned = AtomicUsize::new(0);

        let task = |_worker_id: usize| {
            snapshot.visit_entries(|entry| {
                let nm = entry.nmethod();
                if nm.is_unloading() {
                    let _locker = entry.lock();
                    if nm.unlink() {
                        self.table.unregister(nm);
                        self.unlinked.push(Arc::clone(nm));
                        unlinked.fetch_add(1, Ordering::Relaxed);
                    }
                    return;
                }
                if unloading_occurred {
                    cleaned.fetch_add(nm.clean_inline_caches(), Ordering::Relaxed);
                }
            });
        };
        match workers {
            Some(workers) => workers.run_task(task),
            None => task(0),
        }
        drop(snapshot);

        let unlinked = unlinked.into_inner();
        log::debug!(
            "unlinked {} nmethods, cleaned {} inline caches, {} remain",
            unlinked,
            cleaned.into_inner(),
            self.table.len()
        );
        unlinked
    }

    /// Releases every unlinked nmethod. Returns the number purged.
    ///
    /// Fatal while a scan of the registry is in flight.
    pub fn purge(&self) -> usize {
        guarantee!(
            !self.table.iteration_in_progress(),
            "purging code roots during {} active scan(s)",
            self.table.iterations()
        );
        let mut purged = 0;
        while let Some(nm) = self.unlinked.pop() {
            nm.purge();
            purged += 1;
        }
        epoch::pin().flush();
        log::debug!("purged {} nmethods", purged);
        purged
    }

    /// Number of unlinked nmethods waiting for purge.
    pub fn pending_purge(&self) -> usize {
        self.unlinked.len()
    }
}

impl Default for CodeRoots {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodeRoots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeRoots")
            .field("nmethods", &self.table.len())
            .field("disarmed_value", &self.disarmed_value())
            .field("armed", &self.armed_phase())
            .field("pending_purge", &self.pending_purge())
            .finish()
    }
}

/// A snapshot of the registry for (possibly parallel) iteration.
///
/// While any iterator is alive, [`CodeRoots::purge`] is fatal.
#[derive(Debug)]
pub struct CodeRootsIterator<'a> {
    snapshot: NMethodTableSnapshot<'a>,
}

impl CodeRootsIterator<'_> {
    /// Number of nmethods captured.
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Applies `f` to each captured nmethod that is still registered. Several
    /// workers may call this on one iterator; each nmethod goes to one of them.
    pub fn possibly_parallel_visit<F>(&self, f: F)
    where
        F: FnMut(&Arc<NMethod>),
    {
        self.snapshot.possibly_parallel_visit(f);
    }
}
