//! Registry configuration.

/// Configuration for [`CodeRoots`](crate::CodeRoots).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRootsConfig {
    /// Master switch for nmethod entry barriers
    pub nmethod_barrier: bool,
    /// Whether classes (and the code that depends on them) unload concurrently
    pub unload_classes: bool,
    /// Whether virtual-thread continuations are in use
    pub continuations_enabled: bool,
    /// Initial slot capacity of the registry list
    pub initial_capacity: usize,
    /// Entries claimed per cursor bump during a parallel visit
    pub claim_stride: usize,
}

impl Default for CodeRootsConfig {
    fn default() -> Self {
        CodeRootsConfig {
            nmethod_barrier: true,
            unload_classes: true,
            continuations_enabled: false,
            initial_capacity: 256,
            claim_stride: 256,
        }
    }
}

impl CodeRootsConfig {
    /// Whether marking relies on nmethod entry barriers under this
    /// configuration. Callers must check this before arming for mark.
    pub fn use_nmethod_barriers_for_mark(&self) -> bool {
        self.nmethod_barrier && (self.continuations_enabled || self.unload_classes)
    }
}
