//! The code-root registry table.
//!
//! The live set of registered nmethods is a dense list of entry pointers,
//! published through a [`crossbeam_epoch::Atomic`] so readers never lock it.
//!
//! # Structural changes
//!
//! Register, unregister and snapshot creation take a short table lock.
//! Registration appends at the end of the current list, growing it into a
//! list of twice the capacity when full. Unregistration swap-removes the
//! entry: the last entry moves into the vacated slot.
//!
//! # Snapshots
//!
//! A snapshot records the current list and its length, and holds a
//! reference on the list. While a list is referenced it is never modified
//! below that length: an unregister first copies the list and publishes the
//! copy (copy-on-write). Appends land above every snapshot's limit, so they
//! may go into a referenced list in place.
//!
//! # Reclamation
//!
//! Replaced lists and removed entries are retired with
//! [`Guard::defer_destroy`]. Each snapshot pins an epoch guard for its whole
//! lifetime, so nothing retired after the snapshot was taken is freed while
//! a worker may still reach it through the snapshot. A worker that claims an
//! entry which was unregistered in the meantime sees its `unregistered` flag
//! and skips it.

use crate::nmethod::NMethod;
use crossbeam::utils::CachePadded;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use gc_core::{fatal, guarantee};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Registry entry for one nmethod.
pub(crate) struct NMethodEntry {
    nm: Arc<NMethod>,
    table_id: u64,
    /// Slot in the current list; only changed under the table lock
    index: AtomicUsize,
    unregistered: AtomicBool,
    /// Embedded reference count captured at (re-)registration
    oop_count: AtomicUsize,
    /// Serializes the entry barrier and unlinking for this nmethod
    lock: ReentrantMutex<()>,
}

impl NMethodEntry {
    fn new(nm: Arc<NMethod>, table_id: u64, index: usize) -> Self {
        let oop_count = nm.oop_count();
        NMethodEntry {
            nm,
            table_id,
            index: AtomicUsize::new(index),
            unregistered: AtomicBool::new(false),
            oop_count: AtomicUsize::new(oop_count),
            lock: ReentrantMutex::new(()),
        }
    }

    pub(crate) fn nmethod(&self) -> &Arc<NMethod> {
        &self.nm
    }

    pub(crate) fn is_unregistered(&self) -> bool {
        self.unregistered.load(Ordering::Acquire)
    }

    pub(crate) fn oop_count(&self) -> usize {
        self.oop_count.load(Ordering::Relaxed)
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// Re-reads what the registry caches about the nmethod.
    fn refresh(&self) {
        self.oop_count.store(self.nm.oop_count(), Ordering::Relaxed);
    }
}

/// Fixed-capacity array of entry pointers.
///
/// The slots do not own the entries; the table does.
struct NMethodList {
    slots: Box<[Atomic<NMethodEntry>]>,
    /// Number of live snapshots scanning this list
    snapshot_refs: AtomicUsize,
}

impl NMethodList {
    fn with_capacity(capacity: usize) -> Self {
        NMethodList {
            slots: (0..capacity.max(1)).map(|_| Atomic::null()).collect(),
            snapshot_refs: AtomicUsize::new(0),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_shared(&self) -> bool {
        self.snapshot_refs.load(Ordering::Acquire) > 0
    }

    /// A list of `capacity` slots holding the first `len` entry pointers.
    fn copy_of(&self, capacity: usize, len: usize, guard: &Guard) -> Self {
        debug_assert!(len <= capacity);
        let copy = Self::with_capacity(capacity);
        for (dst, src) in copy.slots.iter().zip(&self.slots[..len]) {
            dst.store(src.load(Ordering::Relaxed, guard), Ordering::Relaxed);
        }
        copy
    }
}

/// Concurrent table of registered nmethods.
pub struct NMethodTable {
    id: u64,
    list: Atomic<NMethodList>,
    count: AtomicUsize,
    iterations: AtomicUsize,
    claim_stride: usize,
    lock: Mutex<()>,
}

impl NMethodTable {
    /// An empty table with room for `initial_capacity` entries before it
    /// grows, claiming `claim_stride` entries per cursor bump when visited.
    pub fn new(initial_capacity: usize, claim_stride: usize) -> Self {
        NMethodTable {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            list: Atomic::new(NMethodList::with_capacity(initial_capacity)),
            count: AtomicUsize::new(0),
            iterations: AtomicUsize::new(0),
            claim_stride: claim_stride.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Number of registered nmethods.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether no nmethod is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot capacity of the current list.
    pub fn capacity(&self) -> usize {
        let guard = &epoch::pin();
        let list = self.list.load(Ordering::Acquire, guard);
        // SAFETY: the current list is never null and is protected by `guard`.
        unsafe { list.deref() }.capacity()
    }

    /// Whether at least one snapshot of this table is alive.
    pub fn iteration_in_progress(&self) -> bool {
        self.iterations.load(Ordering::Acquire) > 0
    }

    /// Number of live snapshots.
    pub fn iterations(&self) -> usize {
        self.iterations.load(Ordering::Acquire)
    }

    /// Whether `nm` is registered in this table.
    pub fn contains(&self, nm: &NMethod) -> bool {
        let guard = &epoch::pin();
        let entry = nm.gc_data.load(Ordering::Acquire, guard);
        // SAFETY: entries are only destroyed through the epoch collector.
        unsafe { entry.as_ref() }.is_some_and(|e| e.table_id == self.id && !e.is_unregistered())
    }

    /// Registers `nm`. Registering an nmethod that is already registered
    /// refreshes its entry instead. Returns true if a new entry was added.
    pub fn register(&self, nm: Arc<NMethod>) -> bool {
        let guard = &epoch::pin();
        let _lock = self.lock.lock();

        let existing = nm.gc_data.load(Ordering::Acquire, guard);
        // SAFETY: a non-null gc_data points at a live entry; only the table
        // lock holder clears it, and we hold the lock.
        if let Some(entry) = unsafe { existing.as_ref() } {
            guarantee!(
                entry.table_id == self.id,
                "nmethod {} is registered with another table",
                nm.id()
            );
            entry.refresh();
            log::trace!("refreshed nmethod {} ({})", nm.id(), nm.name());
            return false;
        }

        let mut list_ptr = self.list.load(Ordering::Acquire, guard);
        // SAFETY: the current list is never null and is protected by `guard`.
        let mut list = unsafe { list_ptr.deref() };
        let index = self.count.load(Ordering::Relaxed);
        if index == list.capacity() {
            let grown = Owned::new(list.copy_of(2 * list.capacity(), index, guard));
            let old = self.list.swap(grown, Ordering::AcqRel, guard);
            // SAFETY: the old list is unreachable from the table now; live
            // snapshots keep it alive through their pinned guards.
            unsafe { guard.defer_destroy(old) };
            list_ptr = self.list.load(Ordering::Acquire, guard);
            // SAFETY: just published, non-null.
            list = unsafe { list_ptr.deref() };
            log::debug!("code root table grown to {} slots", list.capacity());
        }

        let entry = Owned::new(NMethodEntry::new(Arc::clone(&nm), self.id, index)).into_shared(guard);
        nm.gc_data.store(entry, Ordering::Release);
        list.slots[index].store(entry, Ordering::Release);
        self.count.store(index + 1, Ordering::Release);
        log::trace!("registered nmethod {} ({}) at {}", nm.id(), nm.name(), index);
        true
    }

    /// Removes `nm` from the table.
    ///
    /// Unregistering an nmethod that is not registered is fatal. Snapshots
    /// taken before this call skip the entry if they have not claimed it
    /// yet; a worker already processing it may finish.
    pub fn unregister(&self, nm: &NMethod) {
        let guard = &epoch::pin();
        let _lock = self.lock.lock();

        let entry_ptr = nm.gc_data.load(Ordering::Acquire, guard);
        // SAFETY: see `register`.
        let entry = match unsafe { entry_ptr.as_ref() } {
            Some(entry) => entry,
            None => fatal(format_args!(
                "unregistering nmethod {} ({}) that is not registered",
                nm.id(),
                nm.name()
            )),
        };
        guarantee!(
            entry.table_id == self.id,
            "nmethod {} is registered with another table",
            nm.id()
        );
        entry.unregistered.store(true, Ordering::Release);

        let count = self.count.load(Ordering::Relaxed);
        let mut list_ptr = self.list.load(Ordering::Acquire, guard);
        // SAFETY: the current list is never null and is protected by `guard`.
        let mut list = unsafe { list_ptr.deref() };
        if list.is_shared() {
            // A snapshot is scanning this list; leave it intact.
            let copy = Owned::new(list.copy_of(list.capacity(), count, guard));
            let old = self.list.swap(copy, Ordering::AcqRel, guard);
            // SAFETY: unreachable from the table; snapshots pin it.
            unsafe { guard.defer_destroy(old) };
            list_ptr = self.list.load(Ordering::Acquire, guard);
            // SAFETY: just published, non-null.
            list = unsafe { list_ptr.deref() };
        }

        let index = entry.index.load(Ordering::Relaxed);
        let last = count - 1;
        debug_assert_eq!(list.slots[index].load(Ordering::Relaxed, guard), entry_ptr);
        if index != last {
            let moved = list.slots[last].load(Ordering::Relaxed, guard);
            list.slots[index].store(moved, Ordering::Release);
            // SAFETY: slots below count always hold live entries.
            unsafe { moved.deref() }.index.store(index, Ordering::Relaxed);
        }
        list.slots[last].store(Shared::null(), Ordering::Release);
        self.count.store(last, Ordering::Release);
        nm.gc_data.store(Shared::null(), Ordering::Release);
        // SAFETY: the entry is unreachable from the table and the nmethod;
        // snapshots that can still reach it keep it alive through their guards.
        unsafe { guard.defer_destroy(entry_ptr) };
        log::trace!("unregistered nmethod {} ({})", nm.id(), nm.name());
    }

    /// Captures the current membership in O(1).
    pub fn snapshot(&self) -> NMethodTableSnapshot<'_> {
        let guard = epoch::pin();
        let _lock = self.lock.lock();
        let list = self.list.load(Ordering::Acquire, &guard);
        // SAFETY: the current list is never null and is protected by `guard`.
        unsafe { list.deref() }
            .snapshot_refs
            .fetch_add(1, Ordering::AcqRel);
        let limit = self.count.load(Ordering::Acquire);
        self.iterations.fetch_add(1, Ordering::AcqRel);
        NMethodTableSnapshot {
            table: self,
            list: list.as_raw(),
            limit,
            stride: self.claim_stride,
            claimed: CachePadded::new(AtomicUsize::new(0)),
            guard,
        }
    }
}

impl Drop for NMethodTable {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no snapshot or other thread can reach
        // the current list or its entries.
        unsafe {
            let guard = epoch::unprotected();
            let list = self.list.load(Ordering::Relaxed, guard);
            let count = *self.count.get_mut();
            if let Some(l) = list.as_ref() {
                for slot in &l.slots[..count] {
                    let entry = slot.load(Ordering::Relaxed, guard);
                    if let Some(e) = entry.as_ref() {
                        e.nm.gc_data.store(Shared::null(), Ordering::Relaxed);
                        drop(entry.into_owned());
                    }
                }
                drop(list.into_owned());
            }
        }
    }
}

impl fmt::Debug for NMethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NMethodTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("iterations", &self.iterations())
            .finish()
    }
}

/// Immutable, partitionable view of a table's membership.
///
/// Many workers may call [`possibly_parallel_visit`](Self::possibly_parallel_visit)
/// on one shared snapshot; together they visit each entry exactly once.
pub struct NMethodTableSnapshot<'a> {
    table: &'a NMethodTable,
    list: *const NMethodList,
    limit: usize,
    stride: usize,
    claimed: CachePadded<AtomicUsize>,
    /// Keeps everything retired after creation alive; dropped last.
    guard: Guard,
}

// SAFETY: workers only read `list` (kept alive by `guard`) and the atomic
// cursor. The guard itself is only touched by Drop, which runs on the owning
// thread because the snapshot is not Send.
unsafe impl Sync for NMethodTableSnapshot<'_> {}

impl NMethodTableSnapshot<'_> {
    /// Number of entries captured.
    pub fn len(&self) -> usize {
        self.limit
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    /// Visits claimed entries that are still registered.
    pub(crate) fn visit_entries<F>(&self, mut f: F)
    where
        F: FnMut(&NMethodEntry),
    {
        // SAFETY: the snapshot's guard keeps the list alive, and slots below
        // `limit` of a referenced list are never rewritten.
        let list = unsafe { &*self.list };
        let guard = &epoch::pin();
        loop {
            let start = self.claimed.fetch_add(self.stride, Ordering::Relaxed);
            if start >= self.limit {
                break;
            }
            let end = (start + self.stride).min(self.limit);
            for slot in &list.slots[start..end] {
                let entry = slot.load(Ordering::Acquire, guard);
                // SAFETY: entries retired after the snapshot was taken are
                // kept alive by the snapshot's guard.
                if let Some(entry) = unsafe { entry.as_ref() } {
                    if !entry.is_unregistered() {
                        f(entry);
                    }
                }
            }
        }
    }

    /// Applies `f` to every captured nmethod that is still registered.
    ///
    /// Safe to call from several threads at once on the same snapshot; each
    /// entry goes to exactly one caller.
    pub fn possibly_parallel_visit<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<NMethod>),
    {
        self.visit_entries(|entry| f(entry.nmethod()));
    }
}

impl Drop for NMethodTableSnapshot<'_> {
    fn drop(&mut self) {
        // SAFETY: the list is still protected by `self.guard`.
        unsafe { &*self.list }
            .snapshot_refs
            .fetch_sub(1, Ordering::AcqRel);
        self.table.iterations.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for NMethodTableSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NMethodTableSnapshot")
            .field("limit", &self.limit)
            .field("claimed", &self.claimed.load(Ordering::Relaxed))
            .finish()
    }
}
