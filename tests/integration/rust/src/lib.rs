//! Integration test suite for the GC primitives
//!
//! This crate provides integration tests that drive the bitmap engine and
//! the code-root registry together through collector phases.

/// Re-export components for test convenience
pub mod components {
    pub use bitmap;
    pub use code_roots;
    pub use gc_core;
}

/// Bytes covered by one mark bit in the simulated heap.
pub const HEAP_WORD_SIZE: usize = 8;

/// Mark-bitmap index of a simulated object address.
pub fn mark_index(addr: usize) -> usize {
    addr / HEAP_WORD_SIZE
}
