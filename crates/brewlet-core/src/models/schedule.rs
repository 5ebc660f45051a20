use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_INTERVAL_LABEL: &str = "Daily";

const BUILTIN_INTERVALS: &[(&str, u64)] = &[
    ("Manual", 0),
    ("Every Hour", 60 * 60),
    ("Every 6 Hours", 6 * 60 * 60),
    ("Every 12 Hours", 12 * 60 * 60),
    ("Daily", 24 * 60 * 60),
    ("Weekly", 7 * 24 * 60 * 60),
];

// Labels written by earlier releases.
const LEGACY_LABELS: &[(&str, &str)] = &[
    ("never", "Manual"),
    ("manual", "Manual"),
    ("hourly", "Every Hour"),
    ("daily", "Daily"),
    ("weekly", "Weekly"),
];

/// A user-defined interval as persisted in settings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CustomInterval {
    pub label: String,
    pub seconds: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ScheduleInterval {
    pub label: String,
    pub seconds: u64,
    pub builtin: bool,
}

impl ScheduleInterval {
    /// `None` for manual-only intervals.
    pub fn period(&self) -> Option<Duration> {
        (self.seconds > 0).then(|| Duration::from_secs(self.seconds))
    }
}

impl Default for ScheduleInterval {
    fn default() -> Self {
        ScheduleConfig::builtin().resolve(None)
    }
}

/// Label-to-interval table: built-ins first, then custom entries whose label is free.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScheduleConfig {
    entries: Vec<ScheduleInterval>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScheduleConfig {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_INTERVALS
                .iter()
                .map(|(label, seconds)| ScheduleInterval {
                    label: (*label).to_string(),
                    seconds: *seconds,
                    builtin: true,
                })
                .collect(),
        }
    }

    pub fn with_custom(custom: impl IntoIterator<Item = CustomInterval>) -> Self {
        let mut config = Self::builtin();
        let mut taken: HashSet<String> = config
            .entries
            .iter()
            .map(|entry| entry.label.clone())
            .collect();

        for interval in custom {
            let label = interval.label.trim().to_string();
            if label.is_empty() || !taken.insert(label.clone()) {
                tracing::debug!(label = %interval.label, "skipping custom interval with reserved or duplicate label");
                continue;
            }
            config.entries.push(ScheduleInterval {
                label,
                seconds: interval.seconds,
                builtin: false,
            });
        }

        config
    }

    pub fn entries(&self) -> &[ScheduleInterval] {
        &self.entries
    }

    pub fn lookup(&self, label: &str) -> Option<&ScheduleInterval> {
        let label = label.trim();
        let canonical = LEGACY_LABELS
            .iter()
            .find(|(legacy, _)| *legacy == label)
            .map(|(_, current)| *current)
            .unwrap_or(label);
        self.entries.iter().find(|entry| entry.label == canonical)
    }

    /// Resolves a persisted label, falling back to the default interval when unknown.
    pub fn resolve(&self, label: Option<&str>) -> ScheduleInterval {
        if let Some(label) = label {
            if let Some(entry) = self.lookup(label) {
                return entry.clone();
            }
            tracing::warn!(label, "unknown check interval label; using default");
        }
        self.lookup(DEFAULT_INTERVAL_LABEL)
            .cloned()
            .unwrap_or(ScheduleInterval {
                label: DEFAULT_INTERVAL_LABEL.to_string(),
                seconds: 24 * 60 * 60,
                builtin: true,
            })
    }
}
