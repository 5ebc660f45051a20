#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use brewlet_core::brew::{BrewRunner, parser_for};
use brewlet_core::execution::{
    ExecutionResult, OutputMode, OutputSink, OutputStream, ProcessExecutor, ProcessExitStatus,
    ProcessOutput, ProcessSpawnRequest, ProcessTerminationMode, ProcessWaitFuture, RunningProcess,
};
use brewlet_core::models::BrewCommands;
use brewlet_core::orchestration::CheckOrchestrator;
use brewlet_core::state::{CheckObserver, StateSnapshot};
use tokio::sync::{Notify, Semaphore};

pub const BREW: &str = "/opt/homebrew/bin/brew";
pub const LISTING: &str = "outdated --verbose";
pub const FORMULA_NAMES: &str = "list --formula -1";
pub const CASK_NAMES: &str = "list --cask -1";
pub const INSTALLED_FORMULAE: &str = "list --formula --versions";
pub const INSTALLED_CASKS: &str = "list --cask --versions";

/// Canned reply for one argument line. A closed gate holds `wait` until opened or terminated.
#[derive(Clone)]
pub struct Scripted {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub gate: Option<Arc<Semaphore>>,
}

impl Scripted {
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            gate: None,
        }
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: &Arc<Semaphore>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }
}

pub fn closed_gate() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(0))
}

pub fn open_gate(gate: &Semaphore) {
    gate.add_permits(1);
}

/// Fake package manager routing on the joined argument line.
#[derive(Default)]
pub struct FakeBrew {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    terminations: Arc<AtomicUsize>,
}

impl FakeBrew {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, args: &str, script: Scripted) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(args.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self, args: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == args).count()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl ProcessExecutor for FakeBrew {
    fn spawn(&self, request: ProcessSpawnRequest) -> ExecutionResult<Box<dyn RunningProcess>> {
        let line = request.command.args.join(" ");
        self.calls.lock().expect("calls lock").push(line.clone());
        let script = self
            .routes
            .lock()
            .expect("routes lock")
            .get(&line)
            .cloned()
            .unwrap_or_else(|| Scripted::ok(""));

        Ok(Box::new(FakeProcess {
            script,
            output: request.output,
            terminated: Arc::new(Notify::new()),
            terminations: Arc::clone(&self.terminations),
        }))
    }
}

struct FakeProcess {
    script: Scripted,
    output: OutputMode,
    terminated: Arc<Notify>,
    terminations: Arc<AtomicUsize>,
}

impl RunningProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn terminate(&self, _mode: ProcessTerminationMode) -> ExecutionResult<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.terminated.notify_one();
        Ok(())
    }

    fn wait(&self) -> ProcessWaitFuture {
        let script = self.script.clone();
        let output = self.output.clone();
        let terminated = Arc::clone(&self.terminated);

        Box::pin(async move {
            let now = SystemTime::now();
            if let Some(gate) = script.gate.clone() {
                tokio::select! {
                    permit = gate.acquire_owned() => drop(permit),
                    _ = terminated.notified() => {
                        return Ok(ProcessOutput {
                            status: ProcessExitStatus::Terminated,
                            stdout: Vec::new(),
                            stderr: Vec::new(),
                            streamed: false,
                            started_at: now,
                            finished_at: SystemTime::now(),
                        });
                    }
                }
            }

            let (stdout, streamed) = match output {
                OutputMode::Buffered => (script.stdout.into_bytes(), false),
                OutputMode::Streaming(sink) => {
                    sink.send_text(OutputStream::Stdout, &script.stdout);
                    sink.send_text(OutputStream::Stderr, &script.stderr);
                    (Vec::new(), true)
                }
            };

            Ok(ProcessOutput {
                status: ProcessExitStatus::ExitCode(script.code),
                stdout,
                stderr: script.stderr.into_bytes(),
                streamed,
                started_at: now,
                finished_at: SystemTime::now(),
            })
        })
    }
}

pub fn runner(brew: &Arc<FakeBrew>) -> Arc<BrewRunner> {
    runner_with(brew, BrewCommands::default())
}

pub fn runner_with(brew: &Arc<FakeBrew>, commands: BrewCommands) -> Arc<BrewRunner> {
    let executor: Arc<dyn ProcessExecutor> = brew.clone();
    Arc::new(BrewRunner::new(executor, Some(PathBuf::from(BREW)), commands))
}

pub fn orchestrator(brew: &Arc<FakeBrew>) -> CheckOrchestrator {
    let runner = runner(brew);
    let parser = parser_for(runner.commands());
    CheckOrchestrator::new(runner, parser)
}

#[derive(Default)]
pub struct RecordingObserver {
    pub snapshots: Mutex<Vec<StateSnapshot>>,
    pub became_outdated: Mutex<Vec<usize>>,
    pub throttled: Mutex<Vec<Duration>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.snapshots.lock().expect("snapshots lock").clone()
    }

    pub fn became_outdated(&self) -> Vec<usize> {
        self.became_outdated.lock().expect("became lock").clone()
    }

    pub fn throttled(&self) -> Vec<Duration> {
        self.throttled.lock().expect("throttled lock").clone()
    }
}

impl CheckObserver for RecordingObserver {
    fn state_changed(&self, snapshot: &StateSnapshot) {
        self.snapshots
            .lock()
            .expect("snapshots lock")
            .push(snapshot.clone());
    }

    fn became_outdated(&self, count: usize) {
        self.became_outdated.lock().expect("became lock").push(count);
    }

    fn manual_check_throttled(&self, retry_after: Duration) {
        self.throttled.lock().expect("throttled lock").push(retry_after);
    }
}

pub fn outdated_names(snapshot: &StateSnapshot) -> Vec<String> {
    snapshot
        .outdated
        .iter()
        .map(|package| package.name.clone())
        .collect()
}

/// Polls `condition` on the runtime until it holds, failing after five seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition was not reached in time");
}

pub fn sink() -> (OutputSink, tokio::sync::mpsc::UnboundedReceiver<brewlet_core::execution::OutputLine>) {
    OutputSink::channel()
}
