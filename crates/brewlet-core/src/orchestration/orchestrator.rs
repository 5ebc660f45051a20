use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::brew::{BrewResult, BrewRunner, OutdatedListingParser, SourceEnricher};
use crate::brew::parser::parse_installed_listing;
use crate::execution::{OutputSink, OutputStream};
use crate::models::{BrewOperation, OutdatedPackage, PackageSource, ScheduleInterval, TriggerKind};
use crate::orchestration::clock::{Clock, SystemClock};
use crate::orchestration::single_flight::SingleFlight;
use crate::orchestration::timer::{ScheduleTimer, SchedulerHandle};
use crate::state::{CheckObserver, NoopObserver, StateSnapshot, StateStore};

pub const MANUAL_CHECK_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckRequest {
    pub kind: TriggerKind,
    pub update_database: bool,
    pub output: Option<OutputSink>,
}

impl CheckRequest {
    /// User-initiated: refreshes the package database first.
    pub fn manual() -> Self {
        Self {
            kind: TriggerKind::Manual,
            update_database: true,
            output: None,
        }
    }

    pub fn scheduled() -> Self {
        Self {
            kind: TriggerKind::Scheduled,
            update_database: false,
            output: None,
        }
    }

    pub fn wake() -> Self {
        Self {
            kind: TriggerKind::Wake,
            ..Self::scheduled()
        }
    }

    pub fn follow_up() -> Self {
        Self {
            kind: TriggerKind::FollowUp,
            ..Self::scheduled()
        }
    }

    pub fn update_database(mut self, update: bool) -> Self {
        self.update_database = update;
        self
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckOutcome {
    Completed { outdated: usize },
    /// Published as an empty list with the error flag raised.
    Failed,
    AlreadyRunning,
    RateLimited { retry_after: Duration },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeOutcome {
    Checked(CheckOutcome),
    Rearmed { remaining: Duration },
    ManualOnly,
}

/// Decides when checks run, runs them, and publishes the results.
pub struct CheckOrchestrator {
    pub(crate) runner: Arc<BrewRunner>,
    parser: Arc<dyn OutdatedListingParser>,
    enricher: SourceEnricher,
    pub(crate) state: StateStore,
    pub(crate) observer: Arc<dyn CheckObserver>,
    clock: Arc<dyn Clock>,
    pub(crate) check_flight: SingleFlight,
    pub(crate) command_flight: SingleFlight,
    timer: ScheduleTimer,
    interval: Mutex<ScheduleInterval>,
    last_manual_start: Mutex<Option<SystemTime>>,
    manual_cooldown: Duration,
}

impl CheckOrchestrator {
    pub fn new(runner: Arc<BrewRunner>, parser: Arc<dyn OutdatedListingParser>) -> Self {
        Self {
            enricher: SourceEnricher::new(Arc::clone(&runner)),
            runner,
            parser,
            state: StateStore::new(),
            observer: Arc::new(NoopObserver),
            clock: Arc::new(SystemClock),
            check_flight: SingleFlight::new(),
            command_flight: SingleFlight::new(),
            timer: ScheduleTimer::new(),
            interval: Mutex::new(ScheduleInterval::default()),
            last_manual_start: Mutex::new(None),
            manual_cooldown: MANUAL_CHECK_COOLDOWN,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CheckObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interval(mut self, interval: ScheduleInterval) -> Self {
        self.interval = Mutex::new(interval);
        self
    }

    pub fn with_manual_cooldown(mut self, cooldown: Duration) -> Self {
        self.manual_cooldown = cooldown;
        self
    }

    pub fn with_probe_concurrency(mut self, limit: usize) -> Self {
        self.enricher = SourceEnricher::new(Arc::clone(&self.runner)).with_probe_concurrency(limit);
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn timer(&self) -> &ScheduleTimer {
        &self.timer
    }

    pub fn interval(&self) -> ScheduleInterval {
        self.interval
            .lock()
            .map(|interval| interval.clone())
            .unwrap_or_default()
    }

    pub fn is_checking(&self) -> bool {
        self.check_flight.is_running()
    }

    /// Switches the active interval and rearms from now.
    pub fn set_interval(&self, interval: ScheduleInterval) {
        tracing::info!(interval = %interval.label, seconds = interval.seconds, "check interval changed");
        if let Ok(mut active) = self.interval.lock() {
            *active = interval;
        }
        self.rearm();
    }

    /// Recomputes the next scheduled time from now and arms the timer for it.
    pub fn rearm(&self) {
        let period = self.interval().period();
        self.state
            .set_next_scheduled(period.map(|period| self.clock.now() + period));
        self.timer.arm(period);
    }

    /// Arms the timer and spawns the loop that fires scheduled checks.
    pub fn start_scheduler(self: &Arc<Self>) -> SchedulerHandle {
        let orchestrator = Arc::clone(self);
        let mut deadlines = self.timer.subscribe();
        self.rearm();

        SchedulerHandle::new(tokio::spawn(async move {
            loop {
                let deadline = *deadlines.borrow_and_update();
                match deadline {
                    None => {
                        if deadlines.changed().await.is_err() {
                            return;
                        }
                    }
                    Some(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {
                                orchestrator.timer.disarm_fired(at);
                                let outcome = orchestrator.trigger(CheckRequest::scheduled()).await;
                                tracing::debug!(?outcome, "scheduled check finished");
                            }
                            changed = deadlines.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }))
    }

    /// Starts a check unless one is already running. Manual triggers are rate limited.
    pub async fn trigger(&self, request: CheckRequest) -> CheckOutcome {
        if request.kind == TriggerKind::Manual
            && let Some(retry_after) = self.manual_retry_after()
        {
            tracing::info!(retry_after_secs = retry_after.as_secs(), "manual check rate limited");
            self.observer.manual_check_throttled(retry_after);
            return CheckOutcome::RateLimited { retry_after };
        }

        let Some(flight) = self.check_flight.try_acquire() else {
            tracing::debug!(kind = ?request.kind, "check already running; trigger ignored");
            return CheckOutcome::AlreadyRunning;
        };

        let started_at = self.clock.now();
        if request.kind == TriggerKind::Manual
            && let Ok(mut last) = self.last_manual_start.lock()
        {
            *last = Some(started_at);
        }

        let running = RunningMark::set(&self.state);
        self.notify_state();
        tracing::info!(kind = ?request.kind, update_database = request.update_database, "check started");

        let result = self.perform_check(&request).await;
        let finished_at = self.clock.now();

        let outcome = match result {
            Ok(packages) => {
                let report = self.state.publish_check_success(packages, finished_at);
                tracing::info!(count = report.outdated_count, "check finished");
                if let Some(count) = report.became_outdated {
                    self.observer.became_outdated(count);
                }
                CheckOutcome::Completed {
                    outdated: report.outdated_count,
                }
            }
            Err(error) => {
                tracing::error!(
                    operation = ?error.operation,
                    kind = ?error.kind,
                    message = %error.message,
                    "check failed"
                );
                self.state.publish_check_failure(finished_at);
                CheckOutcome::Failed
            }
        };

        drop(running);
        self.rearm();
        drop(flight);
        self.notify_state();
        outcome
    }

    /// Called when the host resumes from sleep.
    pub async fn handle_wake(&self) -> WakeOutcome {
        let Some(next) = self.state.snapshot().check.next_scheduled_time else {
            return WakeOutcome::ManualOnly;
        };

        match next.duration_since(self.clock.now()) {
            Ok(remaining) if !remaining.is_zero() => {
                tracing::info!(remaining_secs = remaining.as_secs(), "woke before next scheduled check; rearming");
                self.timer.arm(Some(remaining));
                WakeOutcome::Rearmed { remaining }
            }
            _ => {
                tracing::info!("scheduled check missed during sleep; checking now");
                WakeOutcome::Checked(self.trigger(CheckRequest::wake()).await)
            }
        }
    }

    /// Replaces the installed list with a fresh formula and cask listing.
    pub async fn refresh_installed(&self) -> BrewResult<usize> {
        let (formulae, casks) = tokio::join!(
            self.runner.list_installed_formulae(),
            self.runner.list_installed_casks(),
        );

        let (formulae, casks) = match (formulae, casks) {
            (Ok(formulae), Ok(casks)) => (formulae, casks),
            (Err(error), _) | (_, Err(error)) => {
                tracing::error!(
                    operation = ?error.operation,
                    message = %error.message,
                    "installed listing failed; keeping previous list"
                );
                return Err(error);
            }
        };

        let mut packages = parse_installed_listing(&formulae, PackageSource::Formula);
        packages.extend(parse_installed_listing(&casks, PackageSource::Cask));
        self.state.replace_installed(packages);

        let snapshot = self.state.snapshot();
        self.observer.state_changed(&snapshot);
        Ok(snapshot.installed.len())
    }

    /// Sends a terminate signal to the live process for `operation`, if any.
    pub fn interrupt(&self, operation: BrewOperation) -> bool {
        match self.runner.tracker().interrupt(operation) {
            Ok(interrupted) => interrupted,
            Err(error) => {
                tracing::warn!(operation = operation.as_str(), message = %error.message, "interrupt failed");
                false
            }
        }
    }

    async fn perform_check(&self, request: &CheckRequest) -> BrewResult<Vec<OutdatedPackage>> {
        if request.update_database
            && let Err(error) = self.runner.update_database(request.output.as_ref()).await
        {
            tracing::warn!(
                kind = ?error.kind,
                message = %error.message,
                "package database refresh failed; listing anyway"
            );
        }

        let raw = self.runner.list_outdated().await?;
        if let Some(sink) = &request.output {
            sink.send_text(OutputStream::Stdout, &raw);
        }

        let records = self.parser.parse(&raw);
        Ok(self.enricher.enrich(records).await)
    }

    fn manual_retry_after(&self) -> Option<Duration> {
        let last = (*self.last_manual_start.lock().ok()?)?;
        let elapsed = self.clock.now().duration_since(last).unwrap_or_default();
        (elapsed < self.manual_cooldown).then(|| self.manual_cooldown - elapsed)
    }

    pub(crate) fn notify_state(&self) {
        self.observer.state_changed(&self.state.snapshot());
    }
}

/// Keeps `is_running` truthful even if the check future is dropped mid-flight.
struct RunningMark<'a> {
    state: &'a StateStore,
}

impl<'a> RunningMark<'a> {
    fn set(state: &'a StateStore) -> Self {
        state.set_running(true);
        Self { state }
    }
}

impl Drop for RunningMark<'_> {
    fn drop(&mut self) {
        self.state.set_running(false);
    }
}
