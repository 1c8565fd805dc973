//! Bounded fork/join worker pool.

use crossbeam::thread;
use gc_core::guarantee;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A named group of collector workers.
///
/// [`run_task`](Self::run_task) runs one task on every active worker and
/// returns when all of them have finished. Workers are scoped threads, so a
/// task may borrow from the caller's stack.
#[derive(Debug)]
pub struct WorkerThreads {
    name: String,
    max_workers: usize,
    active_workers: AtomicUsize,
}

impl WorkerThreads {
    /// A pool of up to `max_workers` workers, all active.
    pub fn new(name: impl Into<String>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        WorkerThreads {
            name: name.into(),
            max_workers,
            active_workers: AtomicUsize::new(max_workers),
        }
    }

    /// A pool sized to the machine's available parallelism.
    pub fn with_available_parallelism(name: impl Into<String>) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(name, workers)
    }

    /// Pool name; worker threads are named `<name>#<id>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upper bound on active workers.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of workers the next task will run on.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Sets the number of workers for subsequent tasks.
    ///
    /// Must be between 1 and [`max_workers`](Self::max_workers).
    pub fn set_active_workers(&self, workers: usize) -> usize {
        guarantee!(
            (1..=self.max_workers).contains(&workers),
            "{}: {} active workers requested, max is {}",
            self.name,
            workers,
            self.max_workers
        );
        self.active_workers.store(workers, Ordering::Relaxed);
        log::debug!("{}: using {} of {} workers", self.name, workers, self.max_workers);
        workers
    }

    /// Runs `task(worker_id)` on each active worker and waits for all.
    ///
    /// With a single active worker the task runs on the calling thread. A
    /// panic in any worker is re-raised on the caller after all workers
    /// have stopped.
    pub fn run_task<F>(&self, task: F)
    where
        F: Fn(usize) + Sync,
    {
        let active = self.active_workers();
        if active <= 1 {
            task(0);
            return;
        }
        let task = &task;
        let result = thread::scope(|s| {
            for worker_id in 0..active {
                let spawned = s
                    .builder()
                    .name(format!("{}#{}", self.name, worker_id))
                    .spawn(move |_| task(worker_id));
                if let Err(e) = spawned {
                    log::warn!("{}: failed to spawn worker {}: {}", self.name, worker_id, e);
                    task(worker_id);
                }
            }
        });
        if let Err(panics) = result {
            std::panic::resume_unwind(first_panic(panics));
        }
    }
}

/// Unwraps the first worker panic from the payload `thread::scope` returns.
fn first_panic(payload: Box<dyn Any + Send + 'static>) -> Box<dyn Any + Send + 'static> {
    match payload.downcast::<Vec<Box<dyn Any + Send + 'static>>>() {
        Ok(mut panics) if !panics.is_empty() => panics.swap_remove(0),
        Ok(_) => Box::new("worker panicked"),
        Err(other) => other,
    }
}
