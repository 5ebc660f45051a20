//! The observable snapshot every surface reads from.
//!
//! Only the orchestrator mutates it. Readers either take a [`StateSnapshot`]
//! clone or subscribe to the underlying `watch` channel and await changes.

pub mod observer;

pub use observer::{CheckObserver, NoopObserver};

use std::collections::HashSet;
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::watch;

use crate::models::{CheckState, InstalledPackage, OutdatedPackage};

#[derive(Clone, Debug, Default, Serialize)]
pub struct StateSnapshot {
    pub outdated: Vec<OutdatedPackage>,
    pub installed: Vec<InstalledPackage>,
    pub check: CheckState,
}

impl StateSnapshot {
    pub fn outdated_count(&self) -> usize {
        self.outdated.len()
    }

    pub fn find_outdated(&self, name: &str) -> Option<&OutdatedPackage> {
        self.outdated.iter().find(|package| package.name == name)
    }
}

/// Result of publishing a completed check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublishReport {
    pub outdated_count: usize,
    /// Set when the count moved from zero to positive.
    pub became_outdated: Option<usize>,
}

/// Local edits applied right after a package command exits cleanly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OptimisticMutation {
    RemoveOutdated(Vec<String>),
    ClearOutdated,
    RemoveEverywhere(Vec<String>),
}

pub struct StateStore {
    sender: watch::Sender<StateSnapshot>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StateSnapshot::default());
        Self { sender }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.sender.subscribe()
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.sender
            .borrow()
            .outdated
            .iter()
            .filter(|package| package.selected)
            .map(|package| package.name.clone())
            .collect()
    }

    /// Marks an outdated record for a later bulk command. Returns false for unknown names.
    pub fn set_selected(&self, name: &str, selected: bool) -> bool {
        self.sender.send_if_modified(|state| {
            match state.outdated.iter_mut().find(|package| package.name == name) {
                Some(package) if package.selected != selected => {
                    package.selected = selected;
                    true
                }
                _ => false,
            }
        });
        self.sender
            .borrow()
            .outdated
            .iter()
            .any(|package| package.name == name)
    }

    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.sender.send_if_modified(|state| {
            let changed = state.check.is_running != running;
            state.check.is_running = running;
            changed
        })
    }

    pub(crate) fn set_next_scheduled(&self, next: Option<SystemTime>) {
        self.sender.send_if_modified(|state| {
            let changed = state.check.next_scheduled_time != next;
            state.check.next_scheduled_time = next;
            changed
        });
    }

    pub(crate) fn publish_check_success(
        &self,
        packages: Vec<OutdatedPackage>,
        finished_at: SystemTime,
    ) -> PublishReport {
        let packages = dedup_by_name(packages);
        let outdated_count = packages.len();
        let mut became_outdated = None;

        self.sender.send_modify(|state| {
            if state.check.last_outdated_count == 0 && outdated_count > 0 {
                became_outdated = Some(outdated_count);
            }
            state.outdated = packages;
            state.check.last_outdated_count = outdated_count;
            state.check.last_error = false;
            state.check.last_check_time = Some(finished_at);
            state.check.is_running = false;
        });

        PublishReport {
            outdated_count,
            became_outdated,
        }
    }

    /// Clears the outdated list and raises the error flag. Installed packages are kept.
    pub(crate) fn publish_check_failure(&self, finished_at: SystemTime) {
        self.sender.send_modify(|state| {
            state.outdated.clear();
            state.check.last_error = true;
            state.check.last_check_time = Some(finished_at);
            state.check.is_running = false;
        });
    }

    pub(crate) fn replace_installed(&self, packages: Vec<InstalledPackage>) {
        let mut packages = dedup_by_name(packages);
        packages.sort_by(|left, right| left.name.cmp(&right.name));
        self.sender.send_modify(|state| state.installed = packages);
    }

    pub(crate) fn apply_optimistic(&self, mutation: &OptimisticMutation) {
        self.sender.send_modify(|state| match mutation {
            OptimisticMutation::RemoveOutdated(names) => {
                state.outdated.retain(|package| !names.contains(&package.name));
            }
            OptimisticMutation::ClearOutdated => state.outdated.clear(),
            OptimisticMutation::RemoveEverywhere(names) => {
                state.outdated.retain(|package| !names.contains(&package.name));
                state.installed.retain(|package| !names.contains(&package.name));
            }
        });
    }
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for OutdatedPackage {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for InstalledPackage {
    fn name(&self) -> &str {
        &self.name
    }
}

fn dedup_by_name<T: Named>(packages: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(packages.len());
    for package in packages {
        if seen.insert(package.name().to_string()) {
            unique.push(package);
        } else {
            tracing::debug!(package = package.name(), "dropping duplicate record");
        }
    }
    unique
}
