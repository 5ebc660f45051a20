use std::time::SystemTime;

use brewlet_core::execution::{OutputLine, OutputStream};
use brewlet_core::models::{InstalledPackage, OutdatedPackage, ScheduleInterval};
use brewlet_core::state::StateSnapshot;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn timestamp(at: SystemTime) -> String {
    OffsetDateTime::from(at)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "-".to_string())
}

fn optional_timestamp(at: Option<SystemTime>) -> String {
    at.map_or_else(|| "-".to_string(), timestamp)
}

/// JSON shape of `brewlet check --json`.
#[derive(Serialize)]
pub struct CheckReport<'a> {
    pub outdated: &'a [OutdatedPackage],
    pub last_check: Option<String>,
    pub next_check: Option<String>,
    pub error: bool,
}

impl<'a> CheckReport<'a> {
    pub fn from_snapshot(snapshot: &'a StateSnapshot) -> Self {
        Self {
            outdated: &snapshot.outdated,
            last_check: snapshot.check.last_check_time.map(timestamp),
            next_check: snapshot.check.next_scheduled_time.map(timestamp),
            error: snapshot.check.last_error,
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn print_lines(mut lines: UnboundedReceiver<OutputLine>) {
    while let Some(line) = lines.recv().await {
        match line.stream {
            OutputStream::Stdout => println!("{}", line.text),
            OutputStream::Stderr => eprintln!("{}", line.text),
        }
    }
}

pub fn print_outdated(snapshot: &StateSnapshot) {
    if snapshot.check.last_error {
        println!("Error checking for updates.");
    } else if snapshot.outdated.is_empty() {
        println!("Everything is up to date.");
    } else {
        let width = snapshot
            .outdated
            .iter()
            .map(|package| package.name.len())
            .max()
            .unwrap_or(0);
        for package in &snapshot.outdated {
            println!(
                "{:<width$}  {} -> {}  [{}]",
                package.name, package.current_version, package.available_version, package.source
            );
        }
    }

    println!(
        "last check: {}  next check: {}",
        optional_timestamp(snapshot.check.last_check_time),
        optional_timestamp(snapshot.check.next_scheduled_time)
    );
}

pub fn print_installed(packages: &[InstalledPackage]) {
    if packages.is_empty() {
        println!("No installed packages found.");
        return;
    }
    let width = packages
        .iter()
        .map(|package| package.name.len())
        .max()
        .unwrap_or(0);
    for package in packages {
        println!(
            "{:<width$}  {:<12}  {}",
            package.name, package.version, package.source
        );
    }
}

pub fn print_intervals(entries: &[ScheduleInterval], active: &str) {
    for entry in entries {
        let marker = if entry.label == active { "*" } else { " " };
        let period = match entry.seconds {
            0 => "manual only".to_string(),
            seconds => format!("{seconds}s"),
        };
        let origin = if entry.builtin { "" } else { "  (custom)" };
        println!("{marker} {:<16} {period}{origin}", entry.label);
    }
}
