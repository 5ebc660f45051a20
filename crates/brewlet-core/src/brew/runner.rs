use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::brew::BrewResult;
use crate::execution::{
    CommandSpec, ExecutionResult, OutputMode, OutputSink, ProcessExecutor, ProcessExitStatus,
    ProcessOutput, ProcessSpawnRequest, ProcessTerminationMode, RunningProcess, spawn_validated,
};
use crate::models::{BrewCommands, BrewOperation, CoreError, CoreErrorKind};

pub const HOMEBREW_BIN_DIRS: &[&str] = &[
    "/opt/homebrew/bin",
    "/usr/local/bin",
    "/home/linuxbrew/.linuxbrew/bin",
];

const BREW_EXECUTABLE: &str = "brew";

/// Locates the package-manager executable: explicit path, well-known prefixes, then `PATH`.
pub fn resolve_brew_executable(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.is_file().then(|| path.to_path_buf());
    }

    let search_path = std::env::var("PATH").unwrap_or_default();
    HOMEBREW_BIN_DIRS
        .iter()
        .map(PathBuf::from)
        .chain(std::env::split_paths(&search_path))
        .map(|dir| dir.join(BREW_EXECUTABLE))
        .find(|candidate| candidate.is_file())
}

/// Live process handles keyed by operation, so a superseding run can interrupt a stale one.
#[derive(Default)]
pub struct ProcessTracker {
    active: Mutex<HashMap<BrewOperation, TrackedProcess>>,
    next_token: AtomicU64,
}

struct TrackedProcess {
    token: u64,
    process: Arc<dyn RunningProcess>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `process` for `operation`, terminating any handle still registered for it.
    pub fn track(&self, operation: BrewOperation, process: Arc<dyn RunningProcess>) -> Option<u64> {
        if !operation.is_exclusive() {
            return None;
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let stale = {
            let Ok(mut active) = self.active.lock() else {
                return None;
            };
            active.insert(operation, TrackedProcess { token, process })
        };

        if let Some(stale) = stale {
            tracing::warn!(
                operation = operation.as_str(),
                pid = ?stale.process.pid(),
                "interrupting stale process before starting its replacement"
            );
            if let Err(error) = stale.process.terminate(ProcessTerminationMode::Graceful) {
                tracing::warn!(operation = operation.as_str(), message = %error.message, "failed to interrupt stale process");
            }
        }

        Some(token)
    }

    pub fn release(&self, operation: BrewOperation, token: Option<u64>) {
        let Some(token) = token else {
            return;
        };
        if let Ok(mut active) = self.active.lock()
            && active.get(&operation).is_some_and(|entry| entry.token == token)
        {
            active.remove(&operation);
        }
    }

    /// Sends a terminate signal to the tracked handle for `operation`, if any.
    pub fn interrupt(&self, operation: BrewOperation) -> ExecutionResult<bool> {
        let process = self
            .active
            .lock()
            .ok()
            .and_then(|active| active.get(&operation).map(|entry| entry.process.clone()));
        match process {
            Some(process) => {
                process.terminate(ProcessTerminationMode::Graceful)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Builds and runs package-manager invocations and interprets their exit status.
pub struct BrewRunner {
    executor: Arc<dyn ProcessExecutor>,
    executable: Option<PathBuf>,
    commands: BrewCommands,
    tracker: ProcessTracker,
}

impl BrewRunner {
    pub fn new(
        executor: Arc<dyn ProcessExecutor>,
        executable: Option<PathBuf>,
        commands: BrewCommands,
    ) -> Self {
        Self {
            executor,
            executable,
            commands,
            tracker: ProcessTracker::new(),
        }
    }

    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    pub fn commands(&self) -> &BrewCommands {
        &self.commands
    }

    pub fn tracker(&self) -> &ProcessTracker {
        &self.tracker
    }

    pub fn request(
        &self,
        operation: BrewOperation,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> ExecutionResult<ProcessSpawnRequest> {
        let program = self.executable.as_ref().ok_or_else(|| CoreError {
            operation: Some(operation),
            kind: CoreErrorKind::ExecutableNotFound,
            message: "package manager executable could not be located".to_string(),
        })?;

        let mut command = CommandSpec::new(program.clone())
            .args(args)
            .env("PATH", augmented_path())
            .env("HOMEBREW_NO_ENV_HINTS", "1");
        if operation != BrewOperation::UpdateDatabase {
            command = command.env("HOMEBREW_NO_AUTO_UPDATE", "1");
        }

        Ok(ProcessSpawnRequest::new(operation, command))
    }

    /// Spawns and waits without interpreting the exit status.
    pub async fn run(
        &self,
        operation: BrewOperation,
        args: Vec<String>,
        output: OutputMode,
    ) -> ExecutionResult<ProcessOutput> {
        let request = self.request(operation, args)?.output(output);
        let process: Arc<dyn RunningProcess> =
            Arc::from(spawn_validated(self.executor.as_ref(), request)?);

        let token = self.tracker.track(operation, process.clone());
        let result = process.wait().await;
        self.tracker.release(operation, token);

        result.map_err(|error| error.attribute(operation))
    }

    pub async fn run_for_stdout(
        &self,
        operation: BrewOperation,
        args: Vec<String>,
    ) -> BrewResult<String> {
        let output = self.run(operation, args, OutputMode::Buffered).await?;
        interpret_output(operation, output)
    }

    pub async fn update_database(&self, sink: Option<&OutputSink>) -> BrewResult<()> {
        let output = self
            .run(
                BrewOperation::UpdateDatabase,
                self.commands.refresh.clone(),
                OutputMode::from_sink(sink),
            )
            .await?;
        interpret_output(BrewOperation::UpdateDatabase, output).map(|_| ())
    }

    pub async fn list_outdated(&self) -> BrewResult<String> {
        self.run_for_stdout(BrewOperation::ListOutdated, self.commands.listing.clone())
            .await
    }

    pub async fn list_formula_names(&self) -> BrewResult<String> {
        self.run_for_stdout(
            BrewOperation::ListFormulaNames,
            owned(&["list", "--formula", "-1"]),
        )
        .await
    }

    pub async fn list_cask_names(&self) -> BrewResult<String> {
        self.run_for_stdout(BrewOperation::ListCaskNames, owned(&["list", "--cask", "-1"]))
            .await
    }

    pub async fn list_installed_formulae(&self) -> BrewResult<String> {
        self.run_for_stdout(
            BrewOperation::ListInstalledFormulae,
            owned(&["list", "--formula", "--versions"]),
        )
        .await
    }

    pub async fn list_installed_casks(&self) -> BrewResult<String> {
        self.run_for_stdout(
            BrewOperation::ListInstalledCasks,
            owned(&["list", "--cask", "--versions"]),
        )
        .await
    }

    pub async fn probe_source(&self, name: &str) -> BrewResult<String> {
        self.run_for_stdout(
            BrewOperation::ProbeSource,
            vec!["info".to_string(), "--json=v2".to_string(), name.to_string()],
        )
        .await
    }
}

/// Exit code 0 yields the captured stdout; anything else is a failure carrying stderr.
pub fn interpret_output(operation: BrewOperation, output: ProcessOutput) -> BrewResult<String> {
    match output.status {
        ProcessExitStatus::ExitCode(0) => Ok(output.stdout_text().unwrap_or_default()),
        ProcessExitStatus::ExitCode(code) => Err(CoreError {
            operation: Some(operation),
            kind: CoreErrorKind::NonZeroExit,
            message: format!(
                "process exited with code {code}: {}",
                output.stderr_text().trim()
            ),
        }),
        ProcessExitStatus::Terminated => Err(CoreError {
            operation: Some(operation),
            kind: CoreErrorKind::Terminated,
            message: "process was terminated by signal".to_string(),
        }),
    }
}

// Launch agents and GUI sessions start with a stripped-down PATH.
fn augmented_path() -> String {
    let inherited = std::env::var("PATH").unwrap_or_default();
    let mut dirs: Vec<&str> = HOMEBREW_BIN_DIRS.to_vec();
    if !inherited.is_empty() {
        dirs.push(inherited.as_str());
    }
    dirs.join(":")
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}
