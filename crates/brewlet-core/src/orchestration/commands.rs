use crate::execution::{OutputMode, OutputSink, ProcessExitStatus};
use crate::models::{BrewOperation, CoreError, CoreErrorKind};
use crate::orchestration::orchestrator::{CheckOrchestrator, CheckOutcome, CheckRequest};
use crate::orchestration::OrchestrationResult;
use crate::state::OptimisticMutation;

/// A user-requested mutation of the installed package set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PackageCommand {
    Upgrade(Vec<String>),
    UpgradeAll,
    Uninstall(Vec<String>),
}

impl PackageCommand {
    pub fn operation(&self) -> BrewOperation {
        match self {
            Self::Upgrade(_) | Self::UpgradeAll => BrewOperation::Upgrade,
            Self::Uninstall(_) => BrewOperation::Uninstall,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let (subcommand, names): (&str, &[String]) = match self {
            Self::Upgrade(names) => ("upgrade", names.as_slice()),
            Self::UpgradeAll => ("upgrade", &[]),
            Self::Uninstall(names) => ("uninstall", names.as_slice()),
        };
        std::iter::once(subcommand.to_string())
            .chain(names.iter().cloned())
            .collect()
    }

    pub fn validate(&self) -> OrchestrationResult<()> {
        let names = match self {
            Self::Upgrade(names) | Self::Uninstall(names) => names,
            Self::UpgradeAll => return Ok(()),
        };

        if names.is_empty() {
            return Err(CoreError::new(
                Some(self.operation()),
                CoreErrorKind::InvalidInput,
                "at least one package name is required",
            ));
        }
        if let Some(bad) = names
            .iter()
            .find(|name| name.trim().is_empty() || name.starts_with('-'))
        {
            return Err(CoreError::new(
                Some(self.operation()),
                CoreErrorKind::InvalidInput,
                format!("'{bad}' is not a package name"),
            ));
        }
        Ok(())
    }

    /// What to assume about local state once the command exits with code 0.
    pub fn optimistic_mutation(&self) -> OptimisticMutation {
        match self {
            Self::Upgrade(names) => OptimisticMutation::RemoveOutdated(names.clone()),
            Self::UpgradeAll => OptimisticMutation::ClearOutdated,
            Self::Uninstall(names) => OptimisticMutation::RemoveEverywhere(names.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    Succeeded,
    Failed { exit_code: Option<i32> },
    /// Another package command was still running; nothing was spawned.
    Busy,
    Rejected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    /// Authoritative refresh that followed the command, if one ran.
    pub refresh: Option<CheckOutcome>,
}

impl CheckOrchestrator {
    /// Runs a package command, applies the optimistic edit on success, then refreshes.
    pub async fn run_command(
        &self,
        command: PackageCommand,
        output: Option<OutputSink>,
    ) -> CommandOutcome {
        if let Err(error) = command.validate() {
            tracing::warn!(message = %error.message, "rejected package command");
            return CommandOutcome {
                status: CommandStatus::Rejected,
                refresh: None,
            };
        }

        let Some(flight) = self.command_flight.try_acquire() else {
            tracing::info!(?command, "package command already running");
            return CommandOutcome {
                status: CommandStatus::Busy,
                refresh: None,
            };
        };

        let operation = command.operation();
        tracing::info!(operation = operation.as_str(), args = ?command.args(), "running package command");
        let result = self
            .runner
            .run(operation, command.args(), OutputMode::from_sink(output.as_ref()))
            .await;

        let status = match result {
            Ok(process) if process.success() => {
                self.state.apply_optimistic(&command.optimistic_mutation());
                self.notify_state();
                CommandStatus::Succeeded
            }
            Ok(process) => {
                let exit_code = match process.status {
                    ProcessExitStatus::ExitCode(code) => Some(code),
                    ProcessExitStatus::Terminated => None,
                };
                tracing::error!(
                    operation = operation.as_str(),
                    exit_code = ?exit_code,
                    stderr = %process.stderr_text().trim(),
                    "package command failed"
                );
                CommandStatus::Failed { exit_code }
            }
            Err(error) => {
                tracing::error!(
                    operation = operation.as_str(),
                    kind = ?error.kind,
                    message = %error.message,
                    "package command could not run"
                );
                CommandStatus::Failed { exit_code: None }
            }
        };
        drop(flight);

        let refresh = self.refresh_after_command().await;
        if let Err(error) = self.refresh_installed().await {
            tracing::warn!(message = %error.message, "installed refresh after package command failed");
        }

        CommandOutcome {
            status,
            refresh: Some(refresh),
        }
    }

    /// A check already in flight may have listed before the command ran, so the
    /// follow-up waits for it to release and then runs its own listing.
    async fn refresh_after_command(&self) -> CheckOutcome {
        loop {
            match self.trigger(CheckRequest::follow_up()).await {
                CheckOutcome::AlreadyRunning => {
                    tracing::debug!("check in flight; follow-up refresh waits for it");
                    self.check_flight.released().await;
                }
                outcome => return outcome,
            }
        }
    }
}
