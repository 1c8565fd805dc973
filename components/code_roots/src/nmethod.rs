//! Host-side representation of a compiled method body.
//!
//! An [`NMethod`] carries what the collector needs from compiled code: the
//! entry-guard stamp the compiled prologue compares against the disarmed
//! value, the object references embedded in the code, inline-cache targets
//! pointing at other nmethods, and its unloading lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! alive --make_unloading--> unloading --unlink--> unlinked --purge--> purged
//! ```
//!
//! `unlink` and `purge` are driven by [`CodeRoots`](crate::CodeRoots).

use crate::table::NMethodEntry;
use crossbeam_epoch::Atomic;
use gc_core::guarantee;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A compiled method body as seen by the collector.
pub struct NMethod {
    id: u64,
    name: String,
    /// Raw entry-guard stamp compared by the compiled entry fast path
    guard: AtomicU64,
    /// Object references embedded in the code
    oops: Mutex<Vec<usize>>,
    /// Call targets cached at call sites in this method
    inline_caches: Mutex<Vec<Weak<NMethod>>>,
    unloading: AtomicBool,
    unlinked: AtomicBool,
    purged: AtomicBool,
    /// Registry entry while registered, null otherwise
    pub(crate) gc_data: Atomic<NMethodEntry>,
}

impl NMethod {
    /// Creates an nmethod with no embedded references.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self::with_oops(id, name, Vec::new())
    }

    /// Creates an nmethod embedding the given object references.
    pub fn with_oops(id: u64, name: impl Into<String>, oops: Vec<usize>) -> Self {
        NMethod {
            id,
            name: name.into(),
            guard: AtomicU64::new(0),
            oops: Mutex::new(oops),
            inline_caches: Mutex::new(Vec::new()),
            unloading: AtomicBool::new(false),
            unlinked: AtomicBool::new(false),
            purged: AtomicBool::new(false),
            gc_data: Atomic::null(),
        }
    }

    /// Identifier assigned by the code cache.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Method name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw entry-guard stamp.
    ///
    /// This is what the compiled prologue compares against the disarmed
    /// value. Use [`CodeRoots::stamp_of`](crate::CodeRoots::stamp_of) for
    /// the stamp as the collector interprets it.
    #[inline]
    pub fn guard_value(&self) -> u64 {
        self.guard.load(Ordering::Acquire)
    }

    /// Address of the guard stamp, for code that patches or inlines it.
    pub fn guard_address(&self) -> &AtomicU64 {
        &self.guard
    }

    pub(crate) fn set_guard_value(&self, value: u64) {
        self.guard.store(value, Ordering::Release);
    }

    /// Copy of the embedded object references.
    pub fn oops(&self) -> Vec<usize> {
        self.oops.lock().clone()
    }

    /// Number of embedded object references.
    pub fn oop_count(&self) -> usize {
        self.oops.lock().len()
    }

    /// Replaces the embedded references, as the code installer does when it
    /// patches the code. Re-register the nmethod afterwards.
    pub fn set_oops(&self, oops: Vec<usize>) {
        *self.oops.lock() = oops;
    }

    /// Applies `f` to every embedded reference slot, allowing it to update
    /// the reference in place (for example to a forwarded address).
    pub fn oops_do<F: FnMut(&mut usize)>(&self, f: F) {
        self.oops.lock().iter_mut().for_each(f);
    }

    /// Records `target` as an inline-cache call target of this method.
    pub fn add_inline_cache(&self, target: &Arc<NMethod>) {
        self.inline_caches.lock().push(Arc::downgrade(target));
    }

    /// Live inline-cache targets.
    pub fn inline_cache_targets(&self) -> Vec<Arc<NMethod>> {
        self.inline_caches
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Drops inline-cache entries whose target is gone or unloading.
    /// Returns the number of entries removed.
    pub fn clean_inline_caches(&self) -> usize {
        let mut caches = self.inline_caches.lock();
        let before = caches.len();
        caches.retain(|target| target.upgrade().is_some_and(|nm| !nm.is_unloading()));
        before - caches.len()
    }

    /// Marks this nmethod as depending on unloaded classes.
    pub fn make_unloading(&self) {
        self.unloading.store(true, Ordering::Release);
    }

    /// Whether this nmethod is being unloaded.
    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::Acquire)
    }

    /// Whether this nmethod has been unlinked from the registry.
    pub fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }

    /// Whether this nmethod's resources have been released.
    pub fn is_purged(&self) -> bool {
        self.purged.load(Ordering::Acquire)
    }

    /// Whether the nmethod currently has a registry entry.
    pub fn is_registered(&self) -> bool {
        let guard = &crossbeam_epoch::pin();
        !self.gc_data.load(Ordering::Acquire, guard).is_null()
    }

    /// Transitions to unlinked. Returns false if another thread got there first.
    pub(crate) fn unlink(&self) -> bool {
        guarantee!(
            self.is_unloading(),
            "unlinking nmethod {} ({}) that is not unloading",
            self.id,
            self.name
        );
        !self.unlinked.swap(true, Ordering::AcqRel)
    }

    /// Releases the references held by an unlinked nmethod.
    pub(crate) fn purge(&self) {
        guarantee!(
            self.is_unlinked(),
            "purging nmethod {} ({}) that was never unlinked",
            self.id,
            self.name
        );
        let was_purged = self.purged.swap(true, Ordering::AcqRel);
        guarantee!(!was_purged, "nmethod {} ({}) purged twice", self.id, self.name);
        self.oops.lock().clear();
        self.inline_caches.lock().clear();
    }
}

impl fmt::Debug for NMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NMethod")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("guard", &self.guard_value())
            .field("unloading", &self.is_unloading())
            .field("unlinked", &self.is_unlinked())
            .finish()
    }
}
