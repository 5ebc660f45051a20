use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// At most one holder at a time. Losers are told immediately instead of queueing.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
    on_release: Notify,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Resolves once no guard is held. Returns immediately when idle.
    pub async fn released(&self) {
        loop {
            let notified = self.on_release.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Releases the flight when dropped, including when the owning future is cancelled.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.running.store(false, Ordering::Release);
        self.flight.on_release.notify_waiters();
    }
}
