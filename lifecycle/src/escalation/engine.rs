//! Escalation engine: applies transitions end to end
//!
//! For one request:
//!
//! ```text
//! lock(issue) ─▶ load ─▶ validate ─▶ CAS write ─▶ ledger append ─▶ publish ─▶ unlock
//!                            │                          │
//!                            ▼                          ▼
//!                      Reject (no writes)     retry, then PartialEscalation
//! ```
//!
//! The issue row is written before the ledger entry. A ledger failure after
//! the write leaves the issue advanced and reports `PartialEscalation` with
//! the record, which [`EscalationEngine::retry_audit_append`] can replay.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventBus, LifecycleEvent, SharedEventBus};
use crate::hierarchy::{Jurisdiction, OfficialId, SharedDirectory, Tier};
use crate::projection::{self, DashboardStats, EscalatedIssue};
use crate::state::{
    AppendOutcome, EscalationRecord, Issue, IssueSnapshot, IssueStatus, SharedIssueStore,
    SharedLedger, StoreError,
};

use super::authority::{Decision, Transition, TransitionAuthority};
use super::locks::{IssueGuard, IssueLocks};
use super::request::{Actor, RequestedChange, TransitionRequest};

/// Reason recorded on escalations made by the deadline sweep
pub const AUTO_ESCALATION_REASON: &str = "Auto-escalated due to no response within deadline";

/// Shared reference to the engine
pub type SharedEngine = Arc<EscalationEngine>;

pub struct EscalationEngine {
    store: SharedIssueStore,
    ledger: SharedLedger,
    directory: SharedDirectory,
    authority: TransitionAuthority,
    locks: IssueLocks,
    events: SharedEventBus,
    config: EngineConfig,
}

impl EscalationEngine {
    pub fn new(
        store: SharedIssueStore,
        ledger: SharedLedger,
        directory: SharedDirectory,
        config: EngineConfig,
    ) -> Self {
        let authority = TransitionAuthority::new(directory.clone(), config.max_pending_extensions);
        Self {
            store,
            ledger,
            directory,
            authority,
            locks: IssueLocks::new(),
            events: EventBus::new().shared(),
            config,
        }
    }

    /// Publish on an existing bus instead of a private one
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = events;
        self
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(self)
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    pub fn store(&self) -> &SharedIssueStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Write operations
    // =========================================================================

    pub async fn request_status_change(
        &self,
        issue_id: &str,
        status: IssueStatus,
        actor: Actor,
    ) -> EngineResult<IssueSnapshot> {
        self.apply(TransitionRequest::status(issue_id, status, actor))
            .await
    }

    pub async fn request_escalation(
        &self,
        issue_id: &str,
        reason: &str,
        actor: Actor,
    ) -> EngineResult<IssueSnapshot> {
        self.apply(TransitionRequest::escalate(issue_id, reason, actor))
            .await
    }

    /// Escalate to an explicit tier. Anything other than the next tier is
    /// reserved for administrators.
    pub async fn request_escalation_to(
        &self,
        issue_id: &str,
        target: Tier,
        reason: &str,
        actor: Actor,
    ) -> EngineResult<IssueSnapshot> {
        self.apply(TransitionRequest::escalate_to(issue_id, target, reason, actor))
            .await
    }

    pub async fn request_extension(
        &self,
        issue_id: &str,
        days: u32,
        actor: Actor,
    ) -> EngineResult<IssueSnapshot> {
        self.apply(TransitionRequest::extend(issue_id, days, actor))
            .await
    }

    pub async fn request_reassignment(
        &self,
        issue_id: &str,
        tier: Tier,
        handler: Option<OfficialId>,
        reason: Option<&str>,
        actor: Actor,
    ) -> EngineResult<IssueSnapshot> {
        let mut request = TransitionRequest::reassign(issue_id, tier, handler, actor);
        if let Some(reason) = reason {
            request = request.with_reason(reason);
        }
        self.apply(request).await
    }

    /// Apply one transition request under the issue's lock.
    pub async fn apply(&self, request: TransitionRequest) -> EngineResult<IssueSnapshot> {
        let _guard = self.lock(&request.issue_id).await?;
        let current = self.load(&request.issue_id)?;
        self.commit(current, &request).await
    }

    /// Replay a ledger append reported by `PartialEscalation`.
    ///
    /// The record must describe an escalation the issue row already counts.
    /// Idempotent: a record that already landed is reported as
    /// [`AppendOutcome::AlreadyPresent`]. Pending records replay in sequence
    /// order; a later one is refused while an earlier one is missing.
    pub async fn retry_audit_append(&self, record: &EscalationRecord) -> EngineResult<AppendOutcome> {
        let _guard = self.lock(&record.issue_id).await?;
        let issue = self.load(&record.issue_id)?;
        check_replayable(&issue, record)?;

        match self.append_with_retry(record).await {
            Ok(outcome) => {
                info!(
                    issue_id = %record.issue_id,
                    sequence = record.sequence,
                    ?outcome,
                    "Audit append replayed"
                );
                Ok(outcome)
            }
            Err((_, err)) => Err(err.into()),
        }
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    pub fn get_current_state(&self, issue_id: &str) -> EngineResult<IssueSnapshot> {
        self.load(issue_id)
    }

    /// Escalation records ordered by sequence
    pub fn get_escalation_history(&self, issue_id: &str) -> EngineResult<Vec<EscalationRecord>> {
        self.load(issue_id)?;
        Ok(self.ledger.history(issue_id)?)
    }

    pub fn latest_escalation(&self, issue_id: &str) -> EngineResult<Option<EscalationRecord>> {
        Ok(self.get_escalation_history(issue_id)?.pop())
    }

    /// Issues at `actor_tier` inside `scope`, newest first.
    ///
    /// An empty `statuses` slice means no status filter. Admins see every
    /// tier; citizens have no tier dashboard.
    pub fn list_issues_for_tier(
        &self,
        actor_tier: Tier,
        scope: &Jurisdiction,
        statuses: &[IssueStatus],
    ) -> EngineResult<Vec<IssueSnapshot>> {
        let issues = self.store.list()?;
        projection::issues_for_tier(issues, actor_tier, scope, statuses)
    }

    /// Dashboard counters for `viewer` over `scope`
    pub fn dashboard_stats(&self, viewer: &Actor, scope: &Jurisdiction) -> EngineResult<DashboardStats> {
        let issues = self.store.list()?;
        projection::dashboard_stats(&issues, viewer, scope)
    }

    /// Issues escalated out of `tier` within `scope`, with their latest escalation
    pub fn escalated_from(&self, tier: Tier, scope: &Jurisdiction) -> EngineResult<Vec<EscalatedIssue>> {
        let issues = self.store.list()?;
        projection::escalated_from(issues, tier, scope, |id| {
            self.ledger.history(id).map_err(EngineError::from)
        })
    }

    /// Drop lock slots for issues nobody is working on
    pub fn prune_locks(&self) -> usize {
        self.locks.prune_idle()
    }

    // =========================================================================
    // Sweep support
    // =========================================================================

    /// Escalate one tier as the system administrator if still overdue at `as_of`.
    pub(crate) async fn escalate_if_overdue(
        &self,
        issue_id: &str,
        as_of: DateTime<Utc>,
    ) -> EngineResult<Option<IssueSnapshot>> {
        let _guard = self.lock(issue_id).await?;
        let current = self.load(issue_id)?;
        if !current.is_overdue(as_of) {
            return Ok(None);
        }
        let request = TransitionRequest::escalate(issue_id, AUTO_ESCALATION_REASON, Actor::system());
        self.commit(current, &request).await.map(Some)
    }

    /// Push the deadline of a still-overdue issue to `until` without escalating.
    pub(crate) async fn defer_if_overdue(
        &self,
        issue_id: &str,
        as_of: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> EngineResult<Option<IssueSnapshot>> {
        let _guard = self.lock(issue_id).await?;
        let current = self.load(issue_id)?;
        if !current.is_overdue(as_of) {
            return Ok(None);
        }

        let mut next = current.clone();
        next.next_escalation_at = Some(until);
        next.updated_at = next_timestamp(&current);
        next.version += 1;
        self.store.compare_and_put(current.version, &next)?;

        warn!(
            issue_id = %issue_id,
            tier = %current.tier,
            until = %until,
            "No officials at the next tier; escalation deferred"
        );
        Ok(Some(next))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn lock(&self, issue_id: &str) -> EngineResult<IssueGuard> {
        self.locks
            .acquire(issue_id, self.config.lock_wait)
            .await
            .map_err(|timeout| {
                warn!(issue_id = %issue_id, waited = ?timeout.waited, "Issue lock wait exceeded");
                EngineError::Busy {
                    issue_id: timeout.issue_id,
                    waited_ms: timeout.waited.as_millis() as u64,
                }
            })
    }

    fn load(&self, issue_id: &str) -> EngineResult<Issue> {
        self.store
            .get(issue_id)?
            .ok_or_else(|| EngineError::NotFound(issue_id.to_string()))
    }

    /// Validate and persist `request` against `current`. Caller holds the lock.
    async fn commit(&self, current: Issue, request: &TransitionRequest) -> EngineResult<IssueSnapshot> {
        let now = next_timestamp(&current);

        let transition = match self.authority.validate(&current, request, now) {
            Decision::Allow(transition) => *transition,
            Decision::Reject(rejection) => {
                debug!(
                    issue_id = %current.id,
                    actor = %request.actor,
                    change = request.change.label(),
                    kind = %rejection.kind,
                    "Transition rejected: {}",
                    rejection.reason
                );
                return Err(rejection.into());
            }
        };

        self.store.compare_and_put(current.version, &transition.next)?;

        if let Some(record) = &transition.escalation {
            info!(
                issue_id = %record.issue_id,
                from = %record.from_tier,
                to = %record.to_tier,
                sequence = record.sequence,
                actor = %request.actor,
                "Issue escalated"
            );

            if let Err((attempts, err)) = self.append_with_retry(record).await {
                warn!(
                    issue_id = %record.issue_id,
                    sequence = record.sequence,
                    attempts,
                    "Audit append failed; escalation committed without ledger entry: {}",
                    err
                );
                self.publish_all(transition_events(&current, &transition, request));
                self.publish(LifecycleEvent::AuditAppendPending {
                    record: record.clone(),
                    attempts,
                    error: err.to_string(),
                    timestamp: now,
                });
                return Err(EngineError::PartialEscalation {
                    issue: Box::new(transition.next),
                    record: record.clone(),
                    attempts,
                    last_error: err.to_string(),
                });
            }
        } else {
            debug!(
                issue_id = %current.id,
                change = request.change.label(),
                actor = %request.actor,
                status = %transition.next.status,
                "Transition applied"
            );
        }

        self.publish_all(transition_events(&current, &transition, request));
        Ok(transition.next)
    }

    async fn append_with_retry(
        &self,
        record: &EscalationRecord,
    ) -> Result<AppendOutcome, (u32, StoreError)> {
        let attempts = self.config.ledger_append_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.ledger.append(record) {
                Ok(outcome) => return Ok(outcome),
                // Occupied slot or sequence gap: another attempt cannot help
                Err(err @ StoreError::LedgerConflict { .. }) => return Err((attempt, err)),
                Err(err) if attempt >= attempts => return Err((attempt, err)),
                Err(err) => {
                    warn!(
                        issue_id = %record.issue_id,
                        sequence = record.sequence,
                        attempt,
                        "Ledger append failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(self.config.ledger_retry_backoff * attempt).await;
                }
            }
        }
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Err(e) = self.events.publish(event) {
            warn!("Event not published: {}", e);
        }
    }

    fn publish_all(&self, events: Vec<LifecycleEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// A replayed record must match an escalation already applied to `issue`.
fn check_replayable(issue: &Issue, record: &EscalationRecord) -> EngineResult<()> {
    let invalid = |reason: String| -> EngineResult<()> { Err(EngineError::InvalidRequest { reason }) };

    if record.sequence == 0 || record.sequence > issue.escalation_count {
        return invalid(format!(
            "Issue {} has {} escalation(s); record sequence {} does not belong to it.",
            issue.id, issue.escalation_count, record.sequence
        ));
    }
    if !record.to_tier.is_above(record.from_tier) {
        return invalid(format!(
            "Record escalates {} -> {}, which is not upward.",
            record.from_tier, record.to_tier
        ));
    }
    if record.timestamp > issue.updated_at {
        return invalid(format!(
            "Record is dated {} but issue {} was last updated at {}.",
            record.timestamp, issue.id, issue.updated_at
        ));
    }
    if record.sequence == issue.escalation_count
        && record.to_tier != issue.tier
        && record.timestamp == issue.updated_at
    {
        return invalid(format!(
            "Issue {} is at {}, not {} as the record claims.",
            issue.id, issue.tier, record.to_tier
        ));
    }
    Ok(())
}

/// Strictly after the issue's last update, even if the wall clock is not.
fn next_timestamp(current: &Issue) -> DateTime<Utc> {
    let now = Utc::now();
    if now > current.updated_at {
        now
    } else {
        current.updated_at + Duration::microseconds(1)
    }
}

fn transition_events(
    previous: &Issue,
    transition: &Transition,
    request: &TransitionRequest,
) -> Vec<LifecycleEvent> {
    let next = &transition.next;
    let actor_id = request.actor.id.clone();
    let timestamp = next.updated_at;
    let mut events = Vec::new();

    if let Some(record) = &transition.escalation {
        events.push(LifecycleEvent::escalated(record));
        return events;
    }

    match &request.change {
        RequestedChange::Status { .. } => {
            events.push(LifecycleEvent::StatusChanged {
                issue_id: next.id.clone(),
                from: previous.status,
                to: next.status,
                tier: next.tier,
                actor_id: actor_id.clone(),
                timestamp,
            });
        }
        RequestedChange::ExtendDeadline { .. } => {
            if let Some(due) = next.next_escalation_at {
                events.push(LifecycleEvent::DeadlineExtended {
                    issue_id: next.id.clone(),
                    tier: next.tier,
                    next_escalation_at: due,
                    extensions_used: next.pending_extension_count,
                    actor_id: actor_id.clone(),
                    timestamp,
                });
            }
        }
        RequestedChange::Reassign { .. } | RequestedChange::Escalate { .. } => {}
    }

    if previous.handler != next.handler || previous.tier != next.tier {
        events.push(LifecycleEvent::HandlerReassigned {
            issue_id: next.id.clone(),
            tier: next.tier,
            previous_handler: previous.handler.clone(),
            handler: next.handler.clone(),
            actor_id,
            timestamp,
        });
    }

    events
}
