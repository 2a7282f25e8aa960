//! Deadline sweep tests.
//!
//! Tests verify:
//! - overdue issues move up one tier, attributed to the system administrator
//! - unstaffed next tiers defer the deadline instead of escalating
//! - dry runs report the plan without writing
//! - top-tier and not-yet-due issues are left alone
//! - the background sweeper stops on shutdown

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use issue_lifecycle::escalation::{run_sweeper, SweepAction, AUTO_ESCALATION_REASON, SYSTEM_ACTOR_ID};
use issue_lifecycle::hierarchy::{HierarchyConfig, HierarchyDirectory, Jurisdiction, Location, Tier};
use issue_lifecycle::state::{Issue, IssueStatus, MemoryIssueStore, MemoryLedger};
use issue_lifecycle::{EngineConfig, EscalationEngine, SharedEngine};

fn colombo() -> Location {
    Location::new("western", "colombo", "thimbirigasyaya", "kollupitiya")
}

/// Galle has a GN officer but no divisional secretary on the roster.
fn galle() -> Location {
    Location::new("southern", "galle", "akmeemana", "dodangoda")
}

fn engine(config: EngineConfig) -> SharedEngine {
    let hierarchy = HierarchyConfig::default()
        .with_official("gn-col", Tier::GramaNiladhari, Jurisdiction::of(&colombo()))
        .with_official("gn-gal", Tier::GramaNiladhari, Jurisdiction::of(&galle()))
        .with_official(
            "ds-col",
            Tier::DivisionalSecretary,
            Jurisdiction::national()
                .province("western")
                .district("colombo")
                .ds_division("thimbirigasyaya"),
        )
        .with_official("pm-1", Tier::PrimeMinister, Jurisdiction::national());
    EscalationEngine::new(
        MemoryIssueStore::new().shared(),
        MemoryLedger::new().shared(),
        HierarchyDirectory::new(hierarchy).shared(),
        config,
    )
    .shared()
}

/// Insert an issue at `tier` whose deadline passed `overdue_by` ago.
fn seed(engine: &EscalationEngine, location: Location, tier: Tier, overdue_by: Duration) -> Issue {
    let mut issue = Issue::new("Garbage not collected", "Two weeks", location, tier, Duration::days(3));
    issue.next_escalation_at = Some(Utc::now() - overdue_by);
    engine.store().insert(&issue).unwrap();
    issue
}

// ── Escalation ─────────────────────────────────────────────────────

#[tokio::test]
async fn overdue_issue_is_escalated_by_system() {
    let engine = engine(EngineConfig::default());
    let issue = seed(&engine, colombo(), Tier::GramaNiladhari, Duration::hours(2));
    let fresh = seed(&engine, colombo(), Tier::GramaNiladhari, Duration::hours(-24));

    let report = engine.sweep_overdue(Utc::now(), false).await.unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.escalated(), 1);
    assert_eq!(
        report.entries[0].action,
        SweepAction::Escalated {
            to_tier: Tier::DivisionalSecretary
        }
    );

    let current = engine.get_current_state(&issue.id).unwrap();
    assert_eq!(current.tier, Tier::DivisionalSecretary);
    assert_eq!(current.status, IssueStatus::Pending);
    assert!(!current.is_overdue(Utc::now()));

    let record = engine.latest_escalation(&issue.id).unwrap().unwrap();
    assert_eq!(record.actor_id, SYSTEM_ACTOR_ID);
    assert_eq!(record.actor_tier, Tier::Admin);
    assert_eq!(record.reason, AUTO_ESCALATION_REASON);

    assert_eq!(engine.get_current_state(&fresh.id).unwrap(), fresh);
}

#[tokio::test]
async fn resolved_issue_is_never_swept() {
    let engine = engine(EngineConfig::default());
    let mut issue = Issue::new("Fixed", "Done", colombo(), Tier::GramaNiladhari, Duration::days(3));
    issue.status = IssueStatus::Resolved;
    issue.next_escalation_at = Some(Utc::now() - Duration::days(10));
    engine.store().insert(&issue).unwrap();

    let report = engine.sweep_overdue(Utc::now(), false).await.unwrap();
    assert!(report.entries.is_empty());
}

// ── Unstaffed tiers ────────────────────────────────────────────────

#[tokio::test]
async fn unstaffed_next_tier_defers_deadline() {
    let config = EngineConfig {
        unstaffed_retry: Duration::hours(6),
        ..EngineConfig::default()
    };
    let engine = engine(config);
    let issue = seed(&engine, galle(), Tier::GramaNiladhari, Duration::hours(1));
    let now = Utc::now();

    let report = engine.sweep_overdue(now, false).await.unwrap();

    assert_eq!(report.deferred(), 1);
    let until = now + Duration::hours(6);
    assert_eq!(report.entries[0].action, SweepAction::Deferred { until });

    let current = engine.get_current_state(&issue.id).unwrap();
    assert_eq!(current.tier, Tier::GramaNiladhari);
    assert_eq!(current.next_escalation_at, Some(until));
    assert_eq!(current.escalation_count, 0);
    assert_eq!(current.version, issue.version + 1);
    assert!(engine.get_escalation_history(&issue.id).unwrap().is_empty());
}

// ── Top tier ───────────────────────────────────────────────────────

#[tokio::test]
async fn top_tier_issue_is_skipped() {
    let engine = engine(EngineConfig::default());
    let issue = seed(&engine, colombo(), Tier::PrimeMinister, Duration::days(1));

    let report = engine.sweep_overdue(Utc::now(), false).await.unwrap();

    assert_eq!(report.entries[0].action, SweepAction::SkippedTopTier);
    assert_eq!(report.escalated(), 0);
    assert_eq!(engine.get_current_state(&issue.id).unwrap(), issue);
}

// ── Dry run ────────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let engine = engine(EngineConfig::default());
    let due_first = seed(&engine, colombo(), Tier::GramaNiladhari, Duration::hours(5));
    let due_second = seed(&engine, galle(), Tier::GramaNiladhari, Duration::hours(1));

    let report = engine.sweep_overdue(Utc::now(), true).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.entries.len(), 2);
    // Ordered by deadline, oldest first
    assert_eq!(report.entries[0].issue_id, due_first.id);
    assert!(matches!(
        report.entries[0].action,
        SweepAction::WouldEscalate {
            to_tier: Tier::DivisionalSecretary
        }
    ));
    assert!(matches!(
        report.entries[1].action,
        SweepAction::WouldDefer { .. }
    ));

    assert_eq!(engine.get_current_state(&due_first.id).unwrap(), due_first);
    assert_eq!(engine.get_current_state(&due_second.id).unwrap(), due_second);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["entries"][0]["action"], "would_escalate");
    assert_eq!(json["entries"][0]["to_tier"], "divisional_secretary");
}

// ── Background sweeper ─────────────────────────────────────────────

/// Let the spawned sweeper run without moving the paused clock.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn sweeper_passes_once_per_interval_then_stops_on_shutdown() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("issue_lifecycle=debug")
        .with_test_writer()
        .try_init();

    let config = EngineConfig {
        sweep_interval: StdDuration::from_secs(300),
        ..EngineConfig::default()
    };
    let engine = engine(config);
    let first = seed(&engine, colombo(), Tier::GramaNiladhari, Duration::minutes(5));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_sweeper(Arc::clone(&engine), shutdown_rx));

    // The first pass runs as soon as the sweeper starts
    settle().await;
    assert_eq!(engine.get_current_state(&first.id).unwrap().escalation_count, 1);

    let second = seed(&engine, colombo(), Tier::GramaNiladhari, Duration::minutes(1));
    tokio::time::advance(StdDuration::from_secs(299)).await;
    settle().await;
    assert_eq!(engine.get_current_state(&second.id).unwrap().escalation_count, 0);

    tokio::time::advance(StdDuration::from_secs(1)).await;
    settle().await;
    assert_eq!(engine.get_current_state(&second.id).unwrap().escalation_count, 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    // Escalation reset both deadlines into the future
    assert_eq!(engine.get_escalation_history(&first.id).unwrap().len(), 1);
    assert_eq!(engine.get_escalation_history(&second.id).unwrap().len(), 1);
}
