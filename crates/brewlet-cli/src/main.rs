mod render;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use brewlet_core::brew::{BrewRunner, parser_for, resolve_brew_executable};
use brewlet_core::execution::{OutputSink, TokioProcessExecutor};
use brewlet_core::models::settings::{
    KEY_BREW_PATH, KEY_CHECK_INTERVAL, KEY_CUSTOM_INTERVALS, KEY_LAUNCH_AT_LOGIN,
    KEY_LISTING_COMMAND, KEY_NOTIFICATIONS_ENABLED, KEY_REFRESH_COMMAND, KNOWN_KEYS,
    save_check_interval, save_command_args, save_custom_intervals, save_flag,
};
use brewlet_core::models::{CustomInterval, Settings};
use brewlet_core::orchestration::{
    CheckOrchestrator, CheckOutcome, CheckRequest, CommandStatus, PackageCommand,
};
use brewlet_core::persistence::SettingsStore;
use brewlet_core::sqlite::SqliteStore;
use brewlet_core::state::{CheckObserver, StateSnapshot};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;

const LOG_ENV: &str = "BREWLET_LOG";

#[derive(Parser)]
#[command(name = "brewlet")]
#[command(author, version, about = "Watches Homebrew for outdated packages", long_about = None)]
struct Cli {
    /// Settings database (defaults to ~/.config/brewlet/settings.sqlite3)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for outdated packages now
    ///
    /// Each invocation is a one-shot check in a fresh process, so the 60 second
    /// rate limit between manual checks does not apply here. It applies to
    /// manual checks requested from a running `brewlet watch` (SIGUSR1).
    Check {
        /// Skip `brew update` before listing
        #[arg(long)]
        no_update: bool,

        /// Echo brew output while the check runs
        #[arg(short, long)]
        verbose: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List installed formulae and casks
    List {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upgrade the named packages, or everything with --all
    Upgrade {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,

        #[arg(long)]
        all: bool,

        /// Echo brew output while the upgrade runs
        #[arg(short, long)]
        verbose: bool,
    },

    /// Uninstall the named packages
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,

        /// Echo brew output while the uninstall runs
        #[arg(short, long)]
        verbose: bool,
    },

    /// Stay in the foreground and check on the configured schedule
    Watch,

    /// Show or edit the check intervals
    Intervals {
        #[command(subcommand)]
        action: Option<IntervalAction>,
    },

    /// Read or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum IntervalAction {
    /// Make LABEL the active interval
    Use { label: String },

    /// Define a custom interval
    Add { label: String, seconds: u64 },

    /// Delete a custom interval
    Remove { label: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print one key, or every stored key
    Get { key: Option<String> },

    /// Store a value
    Set { key: String, value: String },

    /// Forget a value and fall back to the default
    Unset { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let store = open_store(&db_path)?;

    match cli.command {
        Commands::Check {
            no_update,
            verbose,
            json,
        } => check(&store, !no_update, verbose, json).await,
        Commands::List { json } => list(&store, json).await,
        Commands::Upgrade {
            names,
            all,
            verbose,
        } => {
            let command = if all {
                PackageCommand::UpgradeAll
            } else {
                PackageCommand::Upgrade(names)
            };
            package_command(&store, command, verbose).await
        }
        Commands::Uninstall { names, verbose } => {
            package_command(&store, PackageCommand::Uninstall(names), verbose).await
        }
        Commands::Watch => {
            let settings = Settings::load(&store)?;
            let orchestrator = Arc::new(build_orchestrator(&settings));
            watch::run(orchestrator).await
        }
        Commands::Intervals { action } => intervals(&store, action),
        Commands::Config { action } => config(&store, action),
    }
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow!("HOME is not set; pass --db"))?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("brewlet")
        .join("settings.sqlite3"))
}

fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteStore::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn build_orchestrator(settings: &Settings) -> CheckOrchestrator {
    let executable = resolve_brew_executable(settings.brew_path.as_deref());
    match &executable {
        Some(path) => tracing::debug!(brew = %path.display(), "using brew executable"),
        None => tracing::warn!("brew executable not found; checks will fail until it is installed"),
    }

    let runner = Arc::new(BrewRunner::new(
        Arc::new(TokioProcessExecutor),
        executable,
        settings.commands.clone(),
    ));
    let parser = parser_for(runner.commands());

    CheckOrchestrator::new(runner, parser)
        .with_observer(Arc::new(ConsoleObserver {
            notifications: settings.notifications_enabled,
        }))
        .with_interval(settings.active_interval())
}

/// Logs state transitions and prints a notice when packages become outdated.
struct ConsoleObserver {
    notifications: bool,
}

impl CheckObserver for ConsoleObserver {
    fn state_changed(&self, snapshot: &StateSnapshot) {
        tracing::debug!(
            running = snapshot.check.is_running,
            outdated = snapshot.outdated.len(),
            error = snapshot.check.last_error,
            "state changed"
        );
    }

    fn became_outdated(&self, count: usize) {
        if self.notifications {
            let noun = if count == 1 { "package is" } else { "packages are" };
            eprintln!("brewlet: {count} {noun} outdated");
        }
    }

    fn manual_check_throttled(&self, retry_after: Duration) {
        tracing::warn!(
            retry_after_secs = retry_after.as_secs(),
            "manual check requested too soon; please wait"
        );
    }
}

/// Opens a terminal surface that prints brew output as it arrives.
fn output_surface(verbose: bool) -> (Option<OutputSink>, Option<JoinHandle<()>>) {
    if !verbose {
        return (None, None);
    }
    let (sink, lines) = OutputSink::channel();
    (Some(sink), Some(tokio::spawn(render::print_lines(lines))))
}

async fn check(store: &SqliteStore, update: bool, verbose: bool, json: bool) -> anyhow::Result<()> {
    let settings = Settings::load(store)?;
    let orchestrator = build_orchestrator(&settings);

    let (sink, printer) = output_surface(verbose);
    let mut request = CheckRequest::manual().update_database(update);
    if let Some(sink) = sink {
        request = request.with_output(sink);
    }

    let outcome = orchestrator.trigger(request).await;
    if let Some(printer) = printer {
        printer.await?;
    }

    let snapshot = orchestrator.snapshot();
    if json {
        render::print_json(&render::CheckReport::from_snapshot(&snapshot))?;
    } else {
        render::print_outdated(&snapshot);
    }

    match outcome {
        CheckOutcome::Completed { .. } => Ok(()),
        CheckOutcome::Failed => bail!("error checking for updates (rerun with --verbose for details)"),
        CheckOutcome::AlreadyRunning => bail!("a check is already running"),
        CheckOutcome::RateLimited { retry_after } => {
            bail!("please wait {}s before checking again", retry_after.as_secs())
        }
    }
}

async fn list(store: &SqliteStore, json: bool) -> anyhow::Result<()> {
    let settings = Settings::load(store)?;
    let orchestrator = build_orchestrator(&settings);
    orchestrator
        .refresh_installed()
        .await
        .context("failed to list installed packages")?;

    let snapshot = orchestrator.snapshot();
    if json {
        render::print_json(&snapshot.installed)?;
    } else {
        render::print_installed(&snapshot.installed);
    }
    Ok(())
}

async fn package_command(
    store: &SqliteStore,
    command: PackageCommand,
    verbose: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load(store)?;
    let orchestrator = build_orchestrator(&settings);

    let (sink, printer) = output_surface(verbose);
    let outcome = orchestrator.run_command(command, sink).await;
    if let Some(printer) = printer {
        printer.await?;
    }

    if outcome.refresh.is_some() {
        render::print_outdated(&orchestrator.snapshot());
    }

    match outcome.status {
        CommandStatus::Succeeded => Ok(()),
        CommandStatus::Failed {
            exit_code: Some(code),
        } => bail!("brew exited with status {code}"),
        CommandStatus::Failed { exit_code: None } => bail!("brew did not complete"),
        CommandStatus::Busy => bail!("another package command is running"),
        CommandStatus::Rejected => bail!("package names must be non-empty and must not start with '-'"),
    }
}

fn intervals(store: &SqliteStore, action: Option<IntervalAction>) -> anyhow::Result<()> {
    let mut settings = Settings::load(store)?;

    match action {
        None => {}
        Some(IntervalAction::Use { label }) => {
            let interval = settings
                .schedule_config()
                .lookup(&label)
                .cloned()
                .ok_or_else(|| anyhow!("unknown interval '{label}'"))?;
            save_check_interval(store, &interval.label)?;
            settings.check_interval = Some(interval.label);
        }
        Some(IntervalAction::Add { label, seconds }) => {
            let label = label.trim().to_string();
            if label.is_empty() {
                bail!("interval label must not be empty");
            }
            if settings.schedule_config().lookup(&label).is_some() {
                bail!("interval '{label}' already exists");
            }
            settings
                .custom_intervals
                .push(CustomInterval { label, seconds });
            save_custom_intervals(store, &settings.custom_intervals)?;
        }
        Some(IntervalAction::Remove { label }) => {
            let before = settings.custom_intervals.len();
            settings
                .custom_intervals
                .retain(|interval| interval.label != label.trim());
            if settings.custom_intervals.len() == before {
                bail!("no custom interval named '{label}'");
            }
            save_custom_intervals(store, &settings.custom_intervals)?;
        }
    }

    render::print_intervals(
        settings.schedule_config().entries(),
        &settings.active_interval().label,
    );
    Ok(())
}

fn config(store: &SqliteStore, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key: None } => {
            for (key, value) in store.list()? {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Get { key: Some(key) } => {
            known_key(&key)?;
            match store.get(&key)? {
                Some(value) => println!("{value}"),
                None => println!("(default)"),
            }
        }
        ConfigAction::Set { key, value } => {
            known_key(&key)?;
            set_value(store, &key, &value)?;
        }
        ConfigAction::Unset { key } => {
            known_key(&key)?;
            store.remove(&key)?;
        }
    }
    Ok(())
}

fn known_key(key: &str) -> anyhow::Result<()> {
    if KNOWN_KEYS.contains(&key) {
        Ok(())
    } else {
        bail!("unknown key '{key}'; expected one of: {}", KNOWN_KEYS.join(", "))
    }
}

fn set_value(store: &SqliteStore, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        KEY_CHECK_INTERVAL => {
            let settings = Settings::load(store)?;
            let interval = settings
                .schedule_config()
                .lookup(value)
                .cloned()
                .ok_or_else(|| anyhow!("unknown interval '{value}'"))?;
            save_check_interval(store, &interval.label)?;
        }
        KEY_CUSTOM_INTERVALS => {
            let intervals: Vec<CustomInterval> = serde_json::from_str(value)
                .context("custom intervals must be a JSON array of {label, seconds}")?;
            save_custom_intervals(store, &intervals)?;
        }
        KEY_LAUNCH_AT_LOGIN | KEY_NOTIFICATIONS_ENABLED => {
            let enabled = match value.trim() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => bail!("expected a boolean, got '{other}'"),
            };
            save_flag(store, key, enabled)?;
        }
        KEY_LISTING_COMMAND | KEY_REFRESH_COMMAND => {
            let args: Vec<String> = value.split_whitespace().map(str::to_owned).collect();
            if args.is_empty() {
                bail!("command override must not be empty");
            }
            save_command_args(store, key, &args)?;
        }
        KEY_BREW_PATH => store.set(key, value.trim())?,
        _ => store.set(key, value)?,
    }
    Ok(())
}
