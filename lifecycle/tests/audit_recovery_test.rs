//! Audit ledger failure and recovery.
//!
//! The issue row is committed before the ledger entry. When every append
//! attempt fails the engine reports `PartialEscalation` carrying the record;
//! replaying it restores `escalation_count == ledger length`.
//!
//! Tests verify:
//! - transient ledger failures are absorbed by the retry loop with growing backoff
//! - exhausted retries surface PartialEscalation with the pending record
//! - an audit_append_pending event is published for the operator
//! - replaying the record is idempotent
//! - replay refuses records the issue never produced and respects sequence order

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use issue_lifecycle::escalation::Actor;
use issue_lifecycle::events::EventFilter;
use issue_lifecycle::hierarchy::{HierarchyConfig, HierarchyDirectory, Jurisdiction, Location, Tier};
use issue_lifecycle::state::{
    AppendOutcome, EscalationLedger, EscalationRecord, Issue, IssueStatus, MemoryIssueStore,
    MemoryLedger, StoreError, StoreResult,
};
use issue_lifecycle::{EngineConfig, EngineError, ErrorKind, EscalationEngine, LifecycleEvent};

/// Ledger that fails the next `failures` appends, then delegates.
struct FlakyLedger {
    inner: MemoryLedger,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyLedger {
    fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryLedger::new(),
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EscalationLedger for FlakyLedger {
    fn append(&self, record: &EscalationRecord) -> StoreResult<AppendOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("ledger replica offline".into()));
        }
        self.inner.append(record)
    }

    fn history(&self, issue_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        self.inner.history(issue_id)
    }
}

fn location() -> Location {
    Location::new("southern", "galle", "akmeemana", "dodangoda")
}

fn engine(ledger: Arc<FlakyLedger>) -> EscalationEngine {
    let loc = location();
    let hierarchy = HierarchyConfig::default()
        .with_official("gn-1", Tier::GramaNiladhari, Jurisdiction::of(&loc))
        .with_official(
            "ds-1",
            Tier::DivisionalSecretary,
            Jurisdiction::national()
                .province("southern")
                .district("galle")
                .ds_division("akmeemana"),
        );
    EscalationEngine::new(
        MemoryIssueStore::new().shared(),
        ledger,
        HierarchyDirectory::new(hierarchy).shared(),
        EngineConfig::default().with_ledger_retry(3, Duration::from_millis(1)),
    )
}

fn admit(engine: &EscalationEngine) -> Issue {
    let issue = Issue::new(
        "Landslide risk",
        "Cracks on the hillside above the school",
        location(),
        Tier::GramaNiladhari,
        chrono::Duration::days(3),
    );
    engine.store().insert(&issue).unwrap();
    issue
}

fn gn() -> Actor {
    Actor::official("gn-1", Tier::GramaNiladhari)
}

// ── Transient failures ─────────────────────────────────────────────

#[tokio::test]
async fn transient_ledger_failures_are_retried() {
    let ledger = FlakyLedger::failing(2);
    let engine = engine(ledger.clone());
    let issue = admit(&engine);

    let updated = engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
        .unwrap();

    assert_eq!(ledger.calls(), 3);
    assert_eq!(updated.escalation_count, 1);
    assert_eq!(engine.get_escalation_history(&issue.id).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ledger_backoff_grows_with_each_attempt() {
    let ledger = FlakyLedger::failing(2);
    let loc = location();
    let engine = EscalationEngine::new(
        MemoryIssueStore::new().shared(),
        ledger.clone(),
        HierarchyDirectory::new(
            HierarchyConfig::default().with_official("gn-1", Tier::GramaNiladhari, Jurisdiction::of(&loc)),
        )
        .shared(),
        EngineConfig::default().with_ledger_retry(3, Duration::from_secs(30)),
    );
    let issue = admit(&engine);

    let started = tokio::time::Instant::now();
    engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
        .unwrap();

    // 30s after the first failure, 60s after the second
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(90), "waited {:?}", waited);
    assert!(waited < Duration::from_secs(91), "waited {:?}", waited);
    assert_eq!(ledger.calls(), 3);
}

// ── Exhausted retries ──────────────────────────────────────────────

#[tokio::test]
async fn exhausted_retries_report_partial_escalation() {
    let ledger = FlakyLedger::failing(5);
    let engine = engine(ledger.clone());
    let issue = admit(&engine);
    let mut pending = engine
        .events()
        .subscribe_filtered(EventFilter::new().types(vec!["audit_append_pending"]));

    let err = engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialEscalation);
    assert!(err.is_retryable());
    let (advanced, record, attempts) = match err {
        EngineError::PartialEscalation {
            issue,
            record,
            attempts,
            ..
        } => (*issue, record, attempts),
        other => panic!("expected PartialEscalation, got {:?}", other),
    };
    assert_eq!(attempts, 3);
    assert_eq!(ledger.calls(), 3);

    // The issue row moved even though the audit entry did not land
    assert_eq!(advanced, engine.get_current_state(&issue.id).unwrap());
    assert_eq!(advanced.tier, Tier::DivisionalSecretary);
    assert_eq!(advanced.status, IssueStatus::Pending);
    assert_eq!(advanced.escalation_count, 1);
    assert!(engine.get_escalation_history(&issue.id).unwrap().is_empty());
    assert_eq!(record.sequence, 1);
    assert_eq!(record.from_tier, Tier::GramaNiladhari);

    match pending.recv().await.unwrap() {
        LifecycleEvent::AuditAppendPending {
            record: announced,
            attempts,
            ..
        } => {
            assert_eq!(announced, record);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

// ── Replay ─────────────────────────────────────────────────────────

#[tokio::test]
async fn replaying_the_record_restores_the_ledger_once() {
    let ledger = FlakyLedger::failing(4);
    let engine = engine(ledger.clone());
    let issue = admit(&engine);

    let record = match engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
    {
        Err(EngineError::PartialEscalation { record, .. }) => record,
        other => panic!("expected PartialEscalation, got {:?}", other),
    };

    // One failure left; the replay's own retry loop absorbs it
    assert_eq!(
        engine.retry_audit_append(&record).await.unwrap(),
        AppendOutcome::Appended
    );
    assert_eq!(
        engine.retry_audit_append(&record).await.unwrap(),
        AppendOutcome::AlreadyPresent
    );

    let current = engine.get_current_state(&issue.id).unwrap();
    let history = engine.get_escalation_history(&issue.id).unwrap();
    assert_eq!(current.escalation_count as usize, history.len());
    assert_eq!(history, vec![record]);

    // Once repaired the issue escalates normally again
    let next = engine
        .request_escalation(
            &issue.id,
            "district funds needed",
            Actor::official("ds-1", Tier::DivisionalSecretary),
        )
        .await
        .unwrap();
    assert_eq!(next.escalation_count, 2);
    assert_eq!(engine.get_escalation_history(&issue.id).unwrap().len(), 2);
}

#[tokio::test]
async fn structured_partial_error_carries_the_record() {
    let engine = engine(FlakyLedger::failing(3));
    let issue = admit(&engine);

    let err = engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
        .unwrap_err();
    let structured = err.to_structured();

    assert_eq!(structured.code, "PARTIAL_ESCALATION");
    assert!(structured.retryable);
    assert_eq!(
        structured.context.get("issue_id").and_then(|v| v.as_str()),
        Some(issue.id.as_str())
    );
    assert_eq!(structured.context["attempts"], 3);
    let parsed: EscalationRecord =
        serde_json::from_value(structured.context["record"].clone()).unwrap();
    assert_eq!(parsed.to_tier, Tier::DivisionalSecretary);
}

// ── Out-of-order replay ────────────────────────────────────────────

#[tokio::test]
async fn later_escalation_waits_for_the_earlier_pending_record() {
    let ledger = FlakyLedger::failing(3);
    let engine = engine(ledger.clone());
    let issue = admit(&engine);

    let first = match engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
    {
        Err(EngineError::PartialEscalation { record, .. }) => record,
        other => panic!("expected PartialEscalation, got {:?}", other),
    };

    // The ledger is healthy again but sequence 1 is still missing
    let (second, attempts) = match engine
        .request_escalation(
            &issue.id,
            "district funds needed",
            Actor::official("ds-1", Tier::DivisionalSecretary),
        )
        .await
    {
        Err(EngineError::PartialEscalation {
            record, attempts, ..
        }) => (record, attempts),
        other => panic!("expected PartialEscalation, got {:?}", other),
    };
    assert_eq!(second.sequence, 2);
    assert_eq!(attempts, 1, "a sequence gap is not retried");
    let current = engine.get_current_state(&issue.id).unwrap();
    assert_eq!(current.tier, Tier::DistrictSecretary);
    assert_eq!(current.escalation_count, 2);
    assert!(engine.get_escalation_history(&issue.id).unwrap().is_empty());

    let err = engine.retry_audit_append(&second).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);

    assert_eq!(
        engine.retry_audit_append(&first).await.unwrap(),
        AppendOutcome::Appended
    );
    assert_eq!(
        engine.retry_audit_append(&second).await.unwrap(),
        AppendOutcome::Appended
    );
    let history = engine.get_escalation_history(&issue.id).unwrap();
    assert_eq!(history, vec![first, second]);
    assert_eq!(current.escalation_count as usize, history.len());
}

// ── Replay validation ──────────────────────────────────────────────

#[tokio::test]
async fn replay_rejects_records_the_issue_never_produced() {
    let engine = engine(FlakyLedger::failing(0));
    let issue = admit(&engine);

    let fabricated = EscalationRecord {
        issue_id: issue.id.clone(),
        sequence: 1,
        from_tier: Tier::GramaNiladhari,
        to_tier: Tier::PrimeMinister,
        reason: "straight to the top".into(),
        actor_id: "gn-1".into(),
        actor_tier: Tier::GramaNiladhari,
        timestamp: issue.updated_at,
    };
    let err = engine.retry_audit_append(&fabricated).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(engine.get_escalation_history(&issue.id).unwrap().is_empty());

    let ghost = EscalationRecord {
        issue_id: "no-such-issue".into(),
        ..fabricated.clone()
    };
    assert!(matches!(
        engine.retry_audit_append(&ghost).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn replay_rejects_a_record_that_disagrees_with_the_escalation() {
    let engine = engine(FlakyLedger::failing(3));
    let issue = admit(&engine);

    let record = match engine
        .request_escalation(&issue.id, "slope survey required", gn())
        .await
    {
        Err(EngineError::PartialEscalation { record, .. }) => record,
        other => panic!("expected PartialEscalation, got {:?}", other),
    };

    let wrong_target = EscalationRecord {
        to_tier: Tier::ProvincialMinistry,
        ..record.clone()
    };
    let err = engine.retry_audit_append(&wrong_target).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let downward = EscalationRecord {
        from_tier: Tier::DistrictSecretary,
        ..record.clone()
    };
    assert_eq!(
        engine.retry_audit_append(&downward).await.unwrap_err().kind(),
        ErrorKind::InvalidRequest
    );

    let future = EscalationRecord {
        timestamp: record.timestamp + chrono::Duration::hours(1),
        ..record.clone()
    };
    assert_eq!(
        engine.retry_audit_append(&future).await.unwrap_err().kind(),
        ErrorKind::InvalidRequest
    );

    assert_eq!(
        engine.retry_audit_append(&record).await.unwrap(),
        AppendOutcome::Appended
    );
}
