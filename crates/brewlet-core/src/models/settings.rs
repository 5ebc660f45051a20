use std::path::PathBuf;

use crate::models::{CustomInterval, ScheduleConfig, ScheduleInterval};
use crate::persistence::{PersistenceResult, SettingsStore};

pub const KEY_CHECK_INTERVAL: &str = "check_interval";
pub const KEY_CUSTOM_INTERVALS: &str = "custom_intervals";
pub const KEY_LAUNCH_AT_LOGIN: &str = "launch_at_login";
pub const KEY_NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
pub const KEY_LISTING_COMMAND: &str = "listing_command";
pub const KEY_REFRESH_COMMAND: &str = "refresh_command";
pub const KEY_BREW_PATH: &str = "brew_path";

pub const KNOWN_KEYS: &[&str] = &[
    KEY_CHECK_INTERVAL,
    KEY_CUSTOM_INTERVALS,
    KEY_LAUNCH_AT_LOGIN,
    KEY_NOTIFICATIONS_ENABLED,
    KEY_LISTING_COMMAND,
    KEY_REFRESH_COMMAND,
    KEY_BREW_PATH,
];

const DEFAULT_LISTING_ARGS: &[&str] = &["outdated", "--verbose"];
const DEFAULT_REFRESH_ARGS: &[&str] = &["update"];

/// Subcommand-and-flags pairs for the listing and database-refresh invocations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BrewCommands {
    pub listing: Vec<String>,
    pub refresh: Vec<String>,
}

impl Default for BrewCommands {
    fn default() -> Self {
        Self {
            listing: to_owned_args(DEFAULT_LISTING_ARGS),
            refresh: to_owned_args(DEFAULT_REFRESH_ARGS),
        }
    }
}

impl BrewCommands {
    pub fn listing_requests_json(&self) -> bool {
        self.listing.iter().any(|arg| arg.starts_with("--json"))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    pub check_interval: Option<String>,
    pub custom_intervals: Vec<CustomInterval>,
    pub launch_at_login: bool,
    pub notifications_enabled: bool,
    pub commands: BrewCommands,
    pub brew_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            check_interval: None,
            custom_intervals: Vec::new(),
            launch_at_login: false,
            notifications_enabled: true,
            commands: BrewCommands::default(),
            brew_path: None,
        }
    }
}

impl Settings {
    /// Reads every known key. Malformed values are logged and replaced by defaults.
    pub fn load(store: &dyn SettingsStore) -> PersistenceResult<Self> {
        let defaults = Self::default();

        let custom_intervals = match store.get(KEY_CUSTOM_INTERVALS)? {
            Some(raw) => serde_json::from_str::<Vec<CustomInterval>>(&raw).unwrap_or_else(|error| {
                tracing::warn!(key = KEY_CUSTOM_INTERVALS, error = %error, "ignoring malformed custom intervals");
                Vec::new()
            }),
            None => Vec::new(),
        };

        Ok(Self {
            check_interval: store.get(KEY_CHECK_INTERVAL)?.filter(|v| !v.trim().is_empty()),
            custom_intervals,
            launch_at_login: read_flag(store, KEY_LAUNCH_AT_LOGIN, defaults.launch_at_login)?,
            notifications_enabled: read_flag(
                store,
                KEY_NOTIFICATIONS_ENABLED,
                defaults.notifications_enabled,
            )?,
            commands: BrewCommands {
                listing: read_args(store, KEY_LISTING_COMMAND)?
                    .unwrap_or(defaults.commands.listing),
                refresh: read_args(store, KEY_REFRESH_COMMAND)?
                    .unwrap_or(defaults.commands.refresh),
            },
            brew_path: store
                .get(KEY_BREW_PATH)?
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig::with_custom(self.custom_intervals.iter().cloned())
    }

    pub fn active_interval(&self) -> ScheduleInterval {
        self.schedule_config()
            .resolve(self.check_interval.as_deref())
    }
}

pub fn save_check_interval(store: &dyn SettingsStore, label: &str) -> PersistenceResult<()> {
    store.set(KEY_CHECK_INTERVAL, label)
}

pub fn save_custom_intervals(
    store: &dyn SettingsStore,
    intervals: &[CustomInterval],
) -> PersistenceResult<()> {
    let encoded = serde_json::to_string(intervals).map_err(|error| {
        crate::models::CoreError::new(
            None,
            crate::models::CoreErrorKind::InvalidInput,
            format!("failed to encode custom intervals: {error}"),
        )
    })?;
    store.set(KEY_CUSTOM_INTERVALS, &encoded)
}

pub fn save_flag(store: &dyn SettingsStore, key: &str, enabled: bool) -> PersistenceResult<()> {
    store.set(key, if enabled { "1" } else { "0" })
}

pub fn save_command_args(
    store: &dyn SettingsStore,
    key: &str,
    args: &[String],
) -> PersistenceResult<()> {
    let encoded = serde_json::to_string(args).map_err(|error| {
        crate::models::CoreError::new(
            None,
            crate::models::CoreErrorKind::InvalidInput,
            format!("failed to encode command arguments: {error}"),
        )
    })?;
    store.set(key, &encoded)
}

fn read_flag(store: &dyn SettingsStore, key: &str, default: bool) -> PersistenceResult<bool> {
    Ok(match store.get(key)?.as_deref().map(str::trim) {
        Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        _ => default,
    })
}

fn read_args(store: &dyn SettingsStore, key: &str) -> PersistenceResult<Option<Vec<String>>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(args) if !args.is_empty() && args.iter().all(|arg| !arg.trim().is_empty()) => {
            Ok(Some(args))
        }
        Ok(_) => {
            tracing::warn!(key, "ignoring empty command override");
            Ok(None)
        }
        Err(_) => {
            // Older releases stored the override as a plain space-separated string.
            let args: Vec<String> = raw.split_whitespace().map(str::to_owned).collect();
            Ok((!args.is_empty()).then_some(args))
        }
    }
}

fn to_owned_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}
