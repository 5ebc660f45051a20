use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use brewlet_core::orchestration::{CheckOrchestrator, CheckRequest};
use brewlet_core::state::StateSnapshot;

use crate::render;

const WAKE_PROBE_PERIOD: Duration = Duration::from_secs(30);
// Wall clock running ahead of the monotonic clock by more than this means the host slept.
const WAKE_SLACK: Duration = Duration::from_secs(60);

#[cfg(unix)]
type ManualSignal = tokio::signal::unix::Signal;
#[cfg(not(unix))]
type ManualSignal = ();

/// Runs scheduled checks in the foreground until interrupted.
///
/// `SIGUSR1` requests a manual check on unix hosts.
pub async fn run(orchestrator: Arc<CheckOrchestrator>) -> anyhow::Result<()> {
    let interval = orchestrator.interval();
    tracing::info!(interval = %interval.label, seconds = interval.seconds, "watching for outdated packages");

    let scheduler = orchestrator.start_scheduler();
    let mut states = orchestrator.state().subscribe();
    let mut manual = manual_signal();

    tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            orchestrator.trigger(CheckRequest::scheduled()).await;
        }
    });

    let mut probe = tokio::time::interval(WAKE_PROBE_PERIOD);
    let mut last_wall = SystemTime::now();
    let mut last_mono = Instant::now();
    let mut last_reported = None;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("stopping");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = states.borrow_and_update().clone();
                if finished_new_check(&snapshot, last_reported) {
                    last_reported = snapshot.check.last_check_time;
                    render::print_outdated(&snapshot);
                }
            }
            _ = probe.tick() => {
                let wall = SystemTime::now();
                let wall_elapsed = wall.duration_since(last_wall).unwrap_or_default();
                let mono_elapsed = last_mono.elapsed();
                last_wall = wall;
                last_mono = Instant::now();

                if slept_through(wall_elapsed, mono_elapsed) {
                    tracing::info!(
                        asleep_secs = wall_elapsed.saturating_sub(mono_elapsed).as_secs(),
                        "host woke from sleep"
                    );
                    let orchestrator = Arc::clone(&orchestrator);
                    tokio::spawn(async move {
                        let outcome = orchestrator.handle_wake().await;
                        tracing::debug!(?outcome, "wake handled");
                    });
                }
            }
            _ = manual_requested(&mut manual) => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    let outcome = orchestrator.trigger(CheckRequest::manual()).await;
                    tracing::debug!(?outcome, "manual check finished");
                });
            }
        }
    }

    scheduler.stop();
    Ok(())
}

fn slept_through(wall_elapsed: Duration, mono_elapsed: Duration) -> bool {
    wall_elapsed > mono_elapsed + WAKE_SLACK
}

fn finished_new_check(snapshot: &StateSnapshot, last_reported: Option<SystemTime>) -> bool {
    !snapshot.check.is_running
        && snapshot.check.last_check_time.is_some()
        && snapshot.check.last_check_time != last_reported
}

fn manual_signal() -> Option<ManualSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::user_defined1()) {
            Ok(signal) => Some(signal),
            Err(error) => {
                tracing::warn!(%error, "cannot listen for SIGUSR1; manual checks disabled");
                None
            }
        }
    }
    #[cfg(not(unix))]
    {
        None
    }
}

async fn manual_requested(signal: &mut Option<ManualSignal>) {
    #[cfg(unix)]
    {
        if let Some(signal) = signal
            && signal.recv().await.is_some()
        {
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = signal;
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use brewlet_core::state::StateSnapshot;

    use super::{finished_new_check, slept_through};

    #[test]
    fn wall_clock_jump_counts_as_sleep() {
        let probe = Duration::from_secs(30);
        assert!(!slept_through(probe, probe));
        assert!(!slept_through(Duration::from_secs(80), probe));
        assert!(slept_through(Duration::from_secs(3 * 3600), probe));
    }

    #[test]
    fn each_finished_check_is_reported_once() {
        let mut snapshot = StateSnapshot::default();
        assert!(!finished_new_check(&snapshot, None));

        let finished = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        snapshot.check.last_check_time = Some(finished);
        snapshot.check.is_running = true;
        assert!(!finished_new_check(&snapshot, None));

        snapshot.check.is_running = false;
        assert!(finished_new_check(&snapshot, None));
        assert!(!finished_new_check(&snapshot, Some(finished)));
    }
}
