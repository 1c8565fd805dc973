//! Error types and fatal invariant reporting.
//!
//! There are exactly two failure classes in the collector primitives:
//!
//! 1. Contract violations (bad index, double unregister, purge during a scan,
//!    re-entrant arming). These are bugs in the caller. They are reported with
//!    [`fatal`] and never returned as values.
//! 2. Exhaustion of a bitmap's backing allocator, reported as [`AllocError`].
//!    The caller decides whether that is fatal or worth a retry with another
//!    storage policy.

use std::fmt;
use thiserror::Error;

/// Failure to obtain backing words for a bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The storage policy could not provide the requested words.
    #[error("out of memory allocating {words} bitmap words")]
    OutOfMemory {
        /// Number of words requested
        words: usize,
    },

    /// The requested bitmap is larger than the maximum representable size.
    #[error("bitmap of {bits} bits exceeds the maximum of {max} bits")]
    SizeOverflow {
        /// Requested size in bits
        bits: usize,
        /// Largest permitted size in bits
        max: usize,
    },
}

/// Result alias for operations that allocate bitmap storage.
pub type AllocResult<T> = Result<T, AllocError>;

/// Reports a broken invariant and aborts the current operation.
///
/// Logs at `error` level and then panics, so a partially applied metadata
/// update is never silently continued.
#[cold]
#[track_caller]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::error!("fatal invariant violation: {}", args);
    panic!("fatal invariant violation: {}", args);
}

/// Checks an invariant in every build profile, calling [`fatal`] on failure.
///
/// # Examples
///
/// ```should_panic
/// let registered = false;
/// gc_core::guarantee!(registered, "nmethod {} is not registered", 7);
/// ```
#[macro_export]
macro_rules! guarantee {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal(format_args!($($arg)+));
        }
    };
}
