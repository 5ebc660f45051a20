use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::brew::parser::parse_name_set;
use crate::brew::runner::BrewRunner;
use crate::brew::BrewResult;
use crate::models::{OutdatedPackage, PackageSource};

const DEFAULT_PROBE_CONCURRENCY: usize = 4;
const CORE_TAP: &str = "homebrew/core";

/// Assigns a provenance to every outdated record. Never leaves a record unresolved.
pub struct SourceEnricher {
    runner: Arc<BrewRunner>,
    probe_concurrency: usize,
}

impl SourceEnricher {
    pub fn new(runner: Arc<BrewRunner>) -> Self {
        Self {
            runner,
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
        }
    }

    pub fn with_probe_concurrency(mut self, limit: usize) -> Self {
        self.probe_concurrency = limit.max(1);
        self
    }

    pub async fn enrich(&self, mut records: Vec<OutdatedPackage>) -> Vec<OutdatedPackage> {
        if records.iter().all(|record| record.source.is_resolved()) {
            return records;
        }

        let (formulae, casks) = tokio::join!(
            self.name_set(self.runner.list_formula_names()),
            self.name_set(self.runner.list_cask_names()),
        );

        let mut pending = Vec::new();
        for (index, record) in records.iter_mut().enumerate() {
            if record.source.is_resolved() {
                continue;
            }
            match resolve_from_sets(&record.name, &formulae, &casks) {
                Some((name, source)) => {
                    record.name = name;
                    record.source = source;
                }
                None => pending.push(index),
            }
        }

        if !pending.is_empty() {
            self.probe_all(&mut records, pending).await;
        }

        for record in records.iter_mut().filter(|record| !record.source.is_resolved()) {
            record.source = PackageSource::Formula;
        }

        records
    }

    async fn name_set(
        &self,
        listing: impl std::future::Future<Output = BrewResult<String>>,
    ) -> HashSet<String> {
        match listing.await {
            Ok(raw) => parse_name_set(&raw),
            Err(error) => {
                tracing::warn!(
                    operation = ?error.operation,
                    message = %error.message,
                    "installed name listing failed; classifying without it"
                );
                HashSet::new()
            }
        }
    }

    async fn probe_all(&self, records: &mut [OutdatedPackage], pending: Vec<usize>) {
        let permits = Arc::new(Semaphore::new(self.probe_concurrency));
        let mut probes = JoinSet::new();

        for index in pending {
            let runner = Arc::clone(&self.runner);
            let permits = Arc::clone(&permits);
            let name = records[index].name.clone();
            probes.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let source = match runner.probe_source(&name).await {
                    Ok(raw) => source_from_probe(&raw),
                    Err(error) => {
                        tracing::warn!(package = %name, message = %error.message, "source probe failed");
                        None
                    }
                };
                (index, source.unwrap_or(PackageSource::Formula))
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, source)) => records[index].source = source,
                Err(error) => tracing::error!(error = %error, "source probe task aborted"),
            }
        }
    }
}

/// Classifies without spawning anything. `None` means a probe is needed.
pub fn resolve_from_sets(
    name: &str,
    formulae: &HashSet<String>,
    casks: &HashSet<String>,
) -> Option<(String, PackageSource)> {
    if casks.contains(name) {
        return Some((name.to_string(), PackageSource::Cask));
    }
    if formulae.contains(name) {
        return Some((name.to_string(), PackageSource::Formula));
    }
    if let Some((tap, short_name)) = name.rsplit_once('/')
        && !tap.is_empty()
        && !short_name.is_empty()
    {
        return Some((short_name.to_string(), PackageSource::Tap(tap.to_string())));
    }
    None
}

/// Reads `info --json=v2`. Ambiguous or empty payloads yield `None`.
pub fn source_from_probe(raw: &str) -> Option<PackageSource> {
    let payload: Value = serde_json::from_str(raw.trim()).ok()?;
    let formulae = payload
        .get("formulae")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let casks = payload
        .get("casks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    match (formulae.first(), casks.first()) {
        (None, Some(_)) => Some(PackageSource::Cask),
        (Some(formula), None) => match formula.get("tap").and_then(Value::as_str) {
            Some(tap) if !tap.is_empty() && tap != CORE_TAP => {
                Some(PackageSource::Tap(tap.to_string()))
            }
            _ => Some(PackageSource::Formula),
        },
        _ => None,
    }
}
