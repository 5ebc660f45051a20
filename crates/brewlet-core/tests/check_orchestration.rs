mod support;

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use brewlet_core::brew::{BrewRunner, TieredTextParser};
use brewlet_core::execution::{OutputStream, ProcessExecutor};
use brewlet_core::models::{BrewCommands, BrewOperation, PackageSource, ScheduleConfig};
use brewlet_core::orchestration::{CheckOrchestrator, CheckOutcome, CheckRequest, ManualClock};
use tokio::task::JoinSet;

use support::{
    CASK_NAMES, FORMULA_NAMES, FakeBrew, INSTALLED_CASKS, INSTALLED_FORMULAE, LISTING,
    RecordingObserver, Scripted, closed_gate, eventually, open_gate, orchestrator,
};

const MIXED_LISTING: &str = include_str!("fixtures/brew/outdated_verbose.txt");

#[tokio::test]
async fn manual_check_refreshes_then_publishes_enriched_records() {
    let brew = FakeBrew::new();
    brew.respond("update", Scripted::ok("Already up-to-date.\n"));
    brew.respond(LISTING, Scripted::ok(MIXED_LISTING));
    brew.respond(FORMULA_NAMES, Scripted::ok("git\npython@3.12\n"));
    brew.respond(CASK_NAMES, Scripted::ok("firefox\n"));
    brew.respond(
        "info --json=v2 mystery",
        Scripted::ok(r#"{"formulae":[],"casks":[{"token":"mystery"}]}"#),
    );

    let observer = RecordingObserver::new();
    let orchestrator = orchestrator(&brew).with_observer(observer.clone());

    let outcome = orchestrator.trigger(CheckRequest::manual()).await;
    assert_eq!(outcome, CheckOutcome::Completed { outdated: 5 });

    let calls = brew.calls();
    assert_eq!(calls[0], "update");
    assert_eq!(calls[1], LISTING);

    let snapshot = orchestrator.snapshot();
    let source_of = |name: &str| snapshot.find_outdated(name).map(|p| p.source.clone());
    assert_eq!(source_of("git"), Some(PackageSource::Formula));
    assert_eq!(source_of("python@3.12"), Some(PackageSource::Formula));
    assert_eq!(source_of("firefox"), Some(PackageSource::Cask));
    assert_eq!(source_of("widget"), Some(PackageSource::Tap("acme/tools".to_string())));
    assert_eq!(source_of("mystery"), Some(PackageSource::Cask));
    assert!(snapshot.outdated.iter().all(|p| p.source.is_resolved()));

    assert!(!snapshot.check.is_running);
    assert!(!snapshot.check.last_error);
    assert_eq!(snapshot.check.last_outdated_count, 5);
    let finished = snapshot.check.last_check_time.expect("check time recorded");
    let next = snapshot.check.next_scheduled_time.expect("daily interval is scheduled");
    assert!(next > finished);

    assert_eq!(observer.became_outdated(), vec![5]);
    assert!(observer.snapshots().iter().any(|s| s.check.is_running));
}

#[tokio::test]
async fn probe_failures_default_to_formula() {
    let brew = FakeBrew::new();
    brew.respond(LISTING, Scripted::ok("oddball 1.0 -> 1.1\n"));
    brew.respond(CASK_NAMES, Scripted::exit(1, "Error: casks unavailable"));
    brew.respond(
        "info --json=v2 oddball",
        Scripted::exit(1, "Error: No available formula with the name \"oddball\""),
    );

    let orchestrator = orchestrator(&brew);
    let outcome = orchestrator.trigger(CheckRequest::scheduled()).await;

    assert_eq!(outcome, CheckOutcome::Completed { outdated: 1 });
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.outdated[0].source, PackageSource::Formula);
    assert_eq!(brew.call_count("info --json=v2 oddball"), 1);
}

#[tokio::test]
async fn empty_listing_spawns_no_enrichment() {
    let brew = FakeBrew::new();
    brew.respond(LISTING, Scripted::ok("==> Outdated Formulae\n\n"));

    let orchestrator = orchestrator(&brew);
    let outcome = orchestrator.trigger(CheckRequest::scheduled()).await;

    assert_eq!(outcome, CheckOutcome::Completed { outdated: 0 });
    assert_eq!(brew.calls(), vec![LISTING.to_string()]);
}

#[tokio::test]
async fn structured_listing_skips_enrichment() {
    let brew = FakeBrew::new();
    let commands = BrewCommands {
        listing: vec!["outdated".to_string(), "--json=v2".to_string()],
        ..BrewCommands::default()
    };
    brew.respond(
        "outdated --json=v2",
        Scripted::ok(
            r#"{"formulae":[{"name":"git","installed_versions":["2.44.0"],"current_version":"2.45.1"}],
                "casks":[{"name":"firefox","installed_versions":["123.0"],"current_version":"124.0"}]}"#,
        ),
    );

    let runner = support::runner_with(&brew, commands);
    let parser = brewlet_core::brew::parser_for(runner.commands());
    let orchestrator = CheckOrchestrator::new(runner, parser);

    let outcome = orchestrator.trigger(CheckRequest::scheduled()).await;
    assert_eq!(outcome, CheckOutcome::Completed { outdated: 2 });
    assert_eq!(brew.calls(), vec!["outdated --json=v2".to_string()]);
    assert_eq!(
        orchestrator.snapshot().find_outdated("firefox").map(|p| p.source.clone()),
        Some(PackageSource::Cask)
    );
}

#[tokio::test]
async fn failed_listing_raises_error_and_keeps_installed() {
    let brew = FakeBrew::new();
    brew.respond(INSTALLED_FORMULAE, Scripted::ok("git 2.44.0\n"));
    brew.respond(LISTING, Scripted::ok("git (2.44.0) < 2.45.1\n"));
    brew.respond(FORMULA_NAMES, Scripted::ok("git\n"));

    let orchestrator = orchestrator(&brew);
    orchestrator.refresh_installed().await.expect("installed refresh");
    orchestrator.trigger(CheckRequest::scheduled()).await;
    assert_eq!(orchestrator.snapshot().outdated.len(), 1);

    brew.respond(LISTING, Scripted::exit(1, "Error: Failed to download"));
    let outcome = orchestrator.trigger(CheckRequest::scheduled()).await;

    assert_eq!(outcome, CheckOutcome::Failed);
    let snapshot = orchestrator.snapshot();
    assert!(snapshot.outdated.is_empty());
    assert!(snapshot.check.last_error);
    assert!(!snapshot.check.is_running);
    assert_eq!(snapshot.installed.len(), 1);
    assert!(snapshot.check.next_scheduled_time.is_some());
}

#[tokio::test]
async fn failed_database_refresh_does_not_block_listing() {
    let brew = FakeBrew::new();
    brew.respond("update", Scripted::exit(1, "Error: network unreachable"));
    brew.respond(LISTING, Scripted::ok("git (2.44.0) < 2.45.1\n"));
    brew.respond(FORMULA_NAMES, Scripted::ok("git\n"));

    let orchestrator = orchestrator(&brew);
    let outcome = orchestrator.trigger(CheckRequest::manual()).await;

    assert_eq!(outcome, CheckOutcome::Completed { outdated: 1 });
    assert!(!orchestrator.snapshot().check.last_error);
}

#[tokio::test]
async fn missing_executable_fails_without_spawning() {
    let brew = FakeBrew::new();
    let executor: Arc<dyn ProcessExecutor> = brew.clone();
    let runner = Arc::new(BrewRunner::new(executor, None, BrewCommands::default()));
    let orchestrator = CheckOrchestrator::new(runner, Arc::new(TieredTextParser));

    let outcome = orchestrator.trigger(CheckRequest::manual()).await;

    assert_eq!(outcome, CheckOutcome::Failed);
    assert!(brew.calls().is_empty());
    assert!(orchestrator.snapshot().check.last_error);
}

#[tokio::test]
async fn concurrent_triggers_spawn_a_single_listing() {
    let brew = FakeBrew::new();
    let gate = closed_gate();
    brew.respond(LISTING, Scripted::ok("git (1) < 2\n").gated(&gate));
    brew.respond(FORMULA_NAMES, Scripted::ok("git\n"));

    let orchestrator = Arc::new(orchestrator(&brew));
    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger(CheckRequest::scheduled()).await }
    });
    eventually(|| brew.call_count(LISTING) == 1).await;
    assert!(orchestrator.snapshot().check.is_running);

    let mut others = JoinSet::new();
    for _ in 0..7 {
        let orchestrator = Arc::clone(&orchestrator);
        others.spawn(async move { orchestrator.trigger(CheckRequest::scheduled()).await });
    }
    while let Some(outcome) = others.join_next().await {
        assert_eq!(outcome.expect("trigger task"), CheckOutcome::AlreadyRunning);
    }

    open_gate(&gate);
    assert_eq!(
        first.await.expect("first trigger"),
        CheckOutcome::Completed { outdated: 1 }
    );
    assert_eq!(brew.call_count(LISTING), 1);
    assert!(!orchestrator.is_checking());
}

#[tokio::test]
async fn outdated_notification_fires_on_zero_to_positive_only() {
    let brew = FakeBrew::new();
    brew.respond(FORMULA_NAMES, Scripted::ok("git\njq\n"));
    let observer = RecordingObserver::new();
    let orchestrator = orchestrator(&brew).with_observer(observer.clone());

    brew.respond(LISTING, Scripted::ok("git (1) < 2\n"));
    orchestrator.trigger(CheckRequest::scheduled()).await;
    brew.respond(LISTING, Scripted::ok("git (1) < 2\njq (1.6) < 1.7\n"));
    orchestrator.trigger(CheckRequest::scheduled()).await;
    brew.respond(LISTING, Scripted::ok(""));
    orchestrator.trigger(CheckRequest::scheduled()).await;
    brew.respond(LISTING, Scripted::ok("jq (1.6) < 1.7\n"));
    orchestrator.trigger(CheckRequest::scheduled()).await;

    assert_eq!(observer.became_outdated(), vec![1, 1]);
}

#[tokio::test]
async fn manual_triggers_are_rate_limited() {
    let brew = FakeBrew::new();
    let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
    let observer = RecordingObserver::new();
    let orchestrator = orchestrator(&brew)
        .with_clock(clock.clone())
        .with_observer(observer.clone());

    assert_eq!(
        orchestrator.trigger(CheckRequest::manual()).await,
        CheckOutcome::Completed { outdated: 0 }
    );
    assert_eq!(
        orchestrator.trigger(CheckRequest::manual()).await,
        CheckOutcome::RateLimited {
            retry_after: Duration::from_secs(60)
        }
    );

    clock.advance(Duration::from_secs(45));
    assert_eq!(
        orchestrator.trigger(CheckRequest::manual()).await,
        CheckOutcome::RateLimited {
            retry_after: Duration::from_secs(15)
        }
    );
    assert_eq!(
        orchestrator.trigger(CheckRequest::scheduled()).await,
        CheckOutcome::Completed { outdated: 0 }
    );

    clock.advance(Duration::from_secs(15));
    assert_eq!(
        orchestrator.trigger(CheckRequest::manual()).await,
        CheckOutcome::Completed { outdated: 0 }
    );

    assert_eq!(
        observer.throttled(),
        vec![Duration::from_secs(60), Duration::from_secs(15)]
    );
    assert_eq!(brew.call_count("update"), 2);
}

#[tokio::test]
async fn streaming_surface_receives_refresh_and_listing_text() {
    let brew = FakeBrew::new();
    brew.respond("update", Scripted::ok("Updated 2 taps (homebrew/core, homebrew/cask).\n"));
    brew.respond(LISTING, Scripted::ok("git (2.44.0) < 2.45.1\n"));
    brew.respond(FORMULA_NAMES, Scripted::ok("git\n"));

    let (sink, mut lines) = support::sink();
    let orchestrator = orchestrator(&brew);
    orchestrator
        .trigger(CheckRequest::manual().with_output(sink))
        .await;

    let mut received = Vec::new();
    while let Ok(line) = lines.try_recv() {
        assert_eq!(line.stream, OutputStream::Stdout);
        received.push(line.text);
    }
    assert_eq!(
        received,
        vec![
            "Updated 2 taps (homebrew/core, homebrew/cask).".to_string(),
            "git (2.44.0) < 2.45.1".to_string(),
        ]
    );
    assert_eq!(orchestrator.snapshot().outdated.len(), 1);
}

#[tokio::test]
async fn dropped_check_leaves_a_stale_process_that_the_next_run_interrupts() {
    let brew = FakeBrew::new();
    let gate = closed_gate();
    brew.respond(LISTING, Scripted::ok("git (1) < 2\n").gated(&gate));

    let orchestrator = orchestrator(&brew);
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), orchestrator.trigger(CheckRequest::scheduled()))
            .await;
    assert!(abandoned.is_err());
    assert!(!orchestrator.is_checking());
    assert!(!orchestrator.snapshot().check.is_running);

    assert!(!orchestrator.interrupt(BrewOperation::UpdateDatabase));
    assert_eq!(brew.terminations(), 0);

    brew.respond(LISTING, Scripted::ok(""));
    let outcome = orchestrator.trigger(CheckRequest::scheduled()).await;

    assert_eq!(outcome, CheckOutcome::Completed { outdated: 0 });
    assert_eq!(brew.terminations(), 1);
    assert_eq!(brew.call_count(LISTING), 2);
}

#[tokio::test]
async fn interrupting_a_running_listing_fails_the_check() {
    let brew = FakeBrew::new();
    let gate = closed_gate();
    brew.respond(LISTING, Scripted::ok("git (1) < 2\n").gated(&gate));

    let orchestrator = Arc::new(orchestrator(&brew));
    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.trigger(CheckRequest::scheduled()).await }
    });
    eventually(|| brew.call_count(LISTING) == 1).await;
    eventually(|| orchestrator.interrupt(BrewOperation::ListOutdated)).await;

    assert_eq!(running.await.expect("check task"), CheckOutcome::Failed);
    assert!(orchestrator.snapshot().check.last_error);
}

#[tokio::test]
async fn installed_refresh_merges_formulae_and_casks() {
    let brew = FakeBrew::new();
    brew.respond(INSTALLED_FORMULAE, Scripted::ok(include_str!("fixtures/brew/installed_formulae.txt")));
    brew.respond(INSTALLED_CASKS, Scripted::ok(include_str!("fixtures/brew/installed_casks.txt")));

    let orchestrator = orchestrator(&brew);
    let count = orchestrator.refresh_installed().await.expect("installed refresh");

    let snapshot = orchestrator.snapshot();
    let names: Vec<_> = snapshot.installed.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(count, 5);
    assert_eq!(names, vec!["firefox", "git", "openssl@3", "visual-studio-code", "wget"]);
    let openssl = &snapshot.installed[2];
    assert_eq!(openssl.version, "3.3.1");
    assert_eq!(openssl.source, PackageSource::Formula);
    assert_eq!(snapshot.installed[0].source, PackageSource::Cask);

    brew.respond(INSTALLED_CASKS, Scripted::exit(1, "Error: cask listing failed"));
    assert!(orchestrator.refresh_installed().await.is_err());
    assert_eq!(orchestrator.snapshot().installed.len(), 5);
}

#[tokio::test]
async fn interval_change_rearms_and_manual_interval_disarms() {
    let brew = FakeBrew::new();
    let start = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let clock = Arc::new(ManualClock::new(start));
    let config = ScheduleConfig::builtin();
    let orchestrator = orchestrator(&brew).with_clock(clock.clone());

    let hourly = config.lookup("Every Hour").cloned().expect("built-in");
    orchestrator.set_interval(hourly);
    assert_eq!(
        orchestrator.snapshot().check.next_scheduled_time,
        Some(start + Duration::from_secs(3600))
    );
    assert!(orchestrator.timer().deadline().is_some());

    let manual = config.lookup("Manual").cloned().expect("built-in");
    orchestrator.set_interval(manual);
    assert_eq!(orchestrator.snapshot().check.next_scheduled_time, None);
    assert_eq!(orchestrator.timer().deadline(), None);
    assert!(brew.calls().is_empty());
}
