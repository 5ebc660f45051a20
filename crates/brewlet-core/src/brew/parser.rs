use std::collections::HashSet;

use serde_json::Value;

use crate::models::{InstalledPackage, OutdatedPackage, PackageSource, UNKNOWN_VERSION};

/// Turns raw listing text into outdated records. Never fails; unusable lines are dropped.
pub trait OutdatedListingParser: Send + Sync {
    fn parse(&self, raw: &str) -> Vec<OutdatedPackage>;
}

/// Line-oriented parser for `outdated --verbose` and its plainer variants.
#[derive(Clone, Copy, Debug, Default)]
pub struct TieredTextParser;

impl OutdatedListingParser for TieredTextParser {
    fn parse(&self, raw: &str) -> Vec<OutdatedPackage> {
        parse_outdated_listing(raw)
    }
}

/// Parser for `outdated --json=v2`. Falls back to the text tiers if the payload is not JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonOutdatedParser;

impl OutdatedListingParser for JsonOutdatedParser {
    fn parse(&self, raw: &str) -> Vec<OutdatedPackage> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(payload) => parse_outdated_json(&payload),
            Err(error) => {
                tracing::warn!(error = %error, "outdated listing is not JSON; parsing as text");
                parse_outdated_listing(raw)
            }
        }
    }
}

pub fn parse_outdated_listing(raw: &str) -> Vec<OutdatedPackage> {
    let mut parsed = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || is_banner_line(line) {
            continue;
        }

        match parse_outdated_line(line) {
            Some(package) => parsed.push(package),
            None => tracing::debug!(line_number = index + 1, line, "dropping unrecognized listing line"),
        }
    }

    parsed
}

fn parse_outdated_line(line: &str) -> Option<OutdatedPackage> {
    parse_relational_line(line)
        .or_else(|| parse_arrow_line(line))
        .or_else(|| parse_name_only_line(line))
}

/// `name (installed[, installed..]) < available` or `... != available`.
fn parse_relational_line(line: &str) -> Option<OutdatedPackage> {
    let (name, rest) = line.split_once(char::is_whitespace)?;
    if !is_package_name_token(name) {
        return None;
    }

    let (installed, rest) = rest.trim_start().strip_prefix('(')?.split_once(')')?;
    let rest = rest.trim_start();
    let available = rest
        .strip_prefix("!=")
        .or_else(|| rest.strip_prefix('<'))?
        .split_whitespace()
        .next()?;

    // Several kegs may be installed side by side; the last one listed is active.
    let current = installed
        .split(',')
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .last()?;

    Some(OutdatedPackage::new(name, current, available))
}

/// `name installed -> available`.
fn parse_arrow_line(line: &str) -> Option<OutdatedPackage> {
    let (left, right) = line.split_once("->")?;
    let mut left_segments = left.split_whitespace();
    let name = left_segments.next()?;
    if !is_package_name_token(name) {
        return None;
    }

    let current = left_segments
        .last()?
        .trim_matches(|ch| matches!(ch, '(' | ')' | ','));
    let available = right.split_whitespace().next()?.trim_end_matches(',');
    if current.is_empty() || available.is_empty() {
        return None;
    }

    Some(OutdatedPackage::new(name, current, available))
}

fn parse_name_only_line(line: &str) -> Option<OutdatedPackage> {
    let name = line.split_whitespace().next()?;
    is_package_name_token(name).then(|| OutdatedPackage::unknown_versions(name))
}

fn parse_outdated_json(payload: &Value) -> Vec<OutdatedPackage> {
    let sections = [("formulae", PackageSource::Formula), ("casks", PackageSource::Cask)];
    let mut parsed = Vec::new();

    for (key, source) in sections {
        let Some(entries) = payload.get(key).and_then(Value::as_array) else {
            continue;
        };

        for entry in entries {
            let Some(name) = entry
                .get("name")
                .or_else(|| entry.get("token"))
                .and_then(Value::as_str)
                .filter(|name| is_package_name_token(name))
            else {
                tracing::debug!(section = key, "dropping outdated entry without a usable name");
                continue;
            };

            let current = entry
                .get("installed_versions")
                .and_then(Value::as_array)
                .and_then(|versions| versions.iter().filter_map(Value::as_str).last())
                .unwrap_or(UNKNOWN_VERSION);
            let available = entry
                .get("current_version")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_VERSION);

            let package = match (&source, name.rsplit_once('/')) {
                (PackageSource::Formula, Some((tap, short_name))) => {
                    OutdatedPackage::new(short_name, current, available)
                        .with_source(PackageSource::Tap(tap.to_string()))
                }
                _ => OutdatedPackage::new(name, current, available).with_source(source.clone()),
            };
            parsed.push(package);
        }
    }

    parsed
}

/// Parses `list --versions` output. The last token of each line is the active version.
pub fn parse_installed_listing(raw: &str, source: PackageSource) -> Vec<InstalledPackage> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_banner_line(line))
        .filter_map(|line| {
            let mut segments = line.split_whitespace();
            let name = segments.next().filter(|name| is_package_name_token(name))?;
            let version = segments.last().unwrap_or(UNKNOWN_VERSION);
            Some(InstalledPackage {
                name: name.to_string(),
                version: version.to_string(),
                source: source.clone(),
            })
        })
        .collect()
}

/// Parses `list -1` output into a name set.
pub fn parse_name_set(raw: &str) -> HashSet<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_banner_line(line))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| is_package_name_token(name))
        .map(str::to_owned)
        .collect()
}

pub fn is_package_name_token(token: &str) -> bool {
    let Some(first) = token.chars().next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '@' | '+' | '-' | '_' | '.' | '/'))
}

fn is_banner_line(line: &str) -> bool {
    const BANNER_PREFIXES: &[&str] = &[
        "==>",
        "Warning:",
        "Error:",
        "Note:",
        "Updated ",
        "Updating Homebrew",
        "Already up-to-date",
        "You have ",
    ];
    BANNER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}
