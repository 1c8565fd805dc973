//! Code-root registry for a concurrent collector.
//!
//! Compiled method bodies ([`NMethod`]s) embed object references, so the
//! collector treats them as roots. This crate keeps the set of registered
//! nmethods and implements the entry-barrier protocol that lets the
//! collector process them lazily:
//!
//! - [`NMethodTable`] - concurrent registry with O(1) snapshots and
//!   exactly-once parallel visits
//! - [`CodeRoots`] - arm/disarm of entry barriers, the entry slow path,
//!   unlinking and purging after class unloading
//! - [`WorkerThreads`] - bounded fork/join pool for parallel sweeps
//!
//! # Examples
//!
//! ```
//! use code_roots::{ArmedPhase, CodeRoots, NMethod, WorkerThreads};
//! use std::sync::Arc;
//!
//! let roots = CodeRoots::default();
//! let nm = Arc::new(NMethod::with_oops(1, "compute", vec![0x1000]));
//! roots.register_nmethod(Arc::clone(&nm));
//!
//! roots.arm_for_mark();
//! let heal = |phase: ArmedPhase, _: &NMethod| assert_eq!(phase, ArmedPhase::Mark);
//! assert!(roots.nmethod_entry_barrier(&nm, &heal));
//! roots.disarm_nmethods();
//!
//! nm.make_unloading();
//! let workers = WorkerThreads::new("unlink", 2);
//! assert_eq!(roots.unlink(Some(&workers), true), 1);
//! assert_eq!(roots.purge(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod barrier;
mod code_roots;
mod config;
mod nmethod;
mod table;
mod workers;

pub use barrier::{ArmedPhase, NMethodBarrier};
pub use code_roots::{CodeRoots, CodeRootsIterator};
pub use config::CodeRootsConfig;
pub use nmethod::NMethod;
pub use table::{NMethodTable, NMethodTableSnapshot};
pub use workers::WorkerThreads;
