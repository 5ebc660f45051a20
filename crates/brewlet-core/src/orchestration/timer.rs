use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Single rearmable deadline. Arming replaces any previous deadline.
pub struct ScheduleTimer {
    deadline: watch::Sender<Option<Instant>>,
}

impl Default for ScheduleTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleTimer {
    pub fn new() -> Self {
        let (deadline, _) = watch::channel(None);
        Self { deadline }
    }

    /// `None` disarms.
    pub fn arm(&self, after: Option<Duration>) {
        self.deadline
            .send_replace(after.map(|delay| Instant::now() + delay));
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Instant>> {
        self.deadline.subscribe()
    }

    /// Clears a deadline that just fired, unless it was rearmed in the meantime.
    pub(crate) fn disarm_fired(&self, fired: Instant) {
        self.deadline.send_if_modified(|deadline| {
            if *deadline == Some(fired) {
                *deadline = None;
                true
            } else {
                false
            }
        });
    }
}

/// Owns the timer loop task. Dropping it stops scheduled checks.
#[derive(Debug)]
pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn stop(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
