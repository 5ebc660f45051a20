use std::time::SystemTime;

use serde::Serialize;

/// Process-wide check bookkeeping published alongside the package lists.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CheckState {
    pub is_running: bool,
    pub last_check_time: Option<SystemTime>,
    /// Absent means the active interval is manual-only.
    pub next_scheduled_time: Option<SystemTime>,
    pub last_error: bool,
    pub last_outdated_count: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TriggerKind {
    Manual,
    Scheduled,
    Wake,
    /// Authoritative refresh following a package command.
    FollowUp,
}
