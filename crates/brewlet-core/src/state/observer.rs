use std::time::Duration;

use crate::state::StateSnapshot;

/// Receives notifications from the orchestrator.
///
/// Callbacks run on whichever runtime worker finished the work. Surfaces that
/// own a UI thread hop onto it themselves.
pub trait CheckObserver: Send + Sync {
    fn state_changed(&self, snapshot: &StateSnapshot);

    /// Outdated count went from zero to `count`.
    fn became_outdated(&self, count: usize);

    fn manual_check_throttled(&self, _retry_after: Duration) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CheckObserver for NoopObserver {
    fn state_changed(&self, _snapshot: &StateSnapshot) {}

    fn became_outdated(&self, _count: usize) {}
}
