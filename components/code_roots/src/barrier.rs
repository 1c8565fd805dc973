//! Armed phases and the slow-path barrier actions.

use crate::nmethod::NMethod;

/// Which collector phase the entry barriers are currently armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArmedPhase {
    /// No phase armed; a stale stamp is simply refreshed
    #[default]
    Disarmed,
    /// Concurrent marking: embedded references must be marked
    Mark,
    /// Concurrent evacuation: embedded references must be forwarded
    Evac,
}

/// Phase-specific work done on the first entry into a stale nmethod.
///
/// Runs with the nmethod's barrier lock held, so at most one thread heals a
/// given nmethod per arm. The lock is reentrant: an action may call back into
/// the entry barrier for the same nmethod.
pub trait NMethodBarrier {
    /// Make the nmethod's embedded references safe for concurrent marking.
    fn heal_for_mark(&self, nm: &NMethod);

    /// Make the nmethod's embedded references point at evacuated copies.
    fn heal_for_evac(&self, nm: &NMethod);
}

impl<F> NMethodBarrier for F
where
    F: Fn(ArmedPhase, &NMethod),
{
    fn heal_for_mark(&self, nm: &NMethod) {
        self(ArmedPhase::Mark, nm)
    }

    fn heal_for_evac(&self, nm: &NMethod) {
        self(ArmedPhase::Evac, nm)
    }
}
