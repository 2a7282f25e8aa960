//! Deadline sweep: automatic escalation of overdue issues
//!
//! An open issue whose `next_escalation_at` has passed moves up one tier,
//! escalated by the built-in `system` administrator. When the next tier has
//! no eligible official for the issue's area the deadline is deferred
//! instead. Each issue is re-checked under its lock before anything is
//! written, so a response that lands mid-sweep wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{EngineResult, ErrorKind};
use crate::hierarchy::Tier;
use crate::state::IssueId;

use super::engine::{EscalationEngine, SharedEngine};

/// What the sweep did (or would do) with one overdue issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SweepAction {
    Escalated { to_tier: Tier },
    WouldEscalate { to_tier: Tier },
    /// Next tier unstaffed for this area
    Deferred { until: DateTime<Utc> },
    WouldDefer { until: DateTime<Utc> },
    /// Already at the top of the ladder
    SkippedTopTier,
    /// Someone acted on the issue after it was listed
    NoLongerOverdue,
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub issue_id: IssueId,
    pub tier: Tier,
    pub due: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub action: SweepAction,
}

/// Result of one sweep pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub as_of: DateTime<Utc>,
    pub dry_run: bool,
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    fn new(as_of: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            as_of,
            dry_run,
            entries: Vec::new(),
        }
    }

    pub fn escalated(&self) -> usize {
        self.count(|a| {
            matches!(
                a,
                SweepAction::Escalated { .. } | SweepAction::WouldEscalate { .. }
            )
        })
    }

    pub fn deferred(&self) -> usize {
        self.count(|a| matches!(a, SweepAction::Deferred { .. } | SweepAction::WouldDefer { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|a| matches!(a, SweepAction::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&SweepAction) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.action)).count()
    }
}

impl EscalationEngine {
    /// Escalate (or defer) every open issue overdue at `now`.
    ///
    /// With `dry_run` nothing is written; the report shows the plan.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>, dry_run: bool) -> EngineResult<SweepReport> {
        let mut overdue: Vec<_> = self
            .store()
            .list()?
            .into_iter()
            .filter(|issue| issue.is_overdue(now))
            .collect();
        overdue.sort_by_key(|issue| issue.next_escalation_at);

        let mut report = SweepReport::new(now, dry_run);
        let directory = self.directory().clone();

        for issue in overdue {
            let action = match directory.next_tier(issue.tier) {
                None => SweepAction::SkippedTopTier,
                Some(next) if directory.official_pool_for(next, &issue.location).is_empty() => {
                    let until = now + self.config().unstaffed_retry;
                    if dry_run {
                        SweepAction::WouldDefer { until }
                    } else {
                        match self.defer_if_overdue(&issue.id, now, until).await {
                            Ok(Some(_)) => SweepAction::Deferred { until },
                            Ok(None) => SweepAction::NoLongerOverdue,
                            Err(e) => failed(&issue.id, &e),
                        }
                    }
                }
                Some(next) if dry_run => SweepAction::WouldEscalate { to_tier: next },
                Some(_) => match self.escalate_if_overdue(&issue.id, now).await {
                    Ok(Some(updated)) => SweepAction::Escalated {
                        to_tier: updated.tier,
                    },
                    Ok(None) => SweepAction::NoLongerOverdue,
                    Err(e) => failed(&issue.id, &e),
                },
            };

            debug!(issue_id = %issue.id, tier = %issue.tier, ?action, "Sweep decision");
            report.entries.push(SweepEntry {
                issue_id: issue.id,
                tier: issue.tier,
                due: issue.next_escalation_at,
                action,
            });
        }

        info!(
            as_of = %now,
            dry_run,
            overdue = report.entries.len(),
            escalated = report.escalated(),
            deferred = report.deferred(),
            failed = report.failed(),
            "Deadline sweep finished"
        );
        Ok(report)
    }
}

fn failed(issue_id: &str, err: &crate::error::EngineError) -> SweepAction {
    warn!(issue_id = %issue_id, kind = %err.kind(), "Sweep could not escalate issue: {}", err);
    SweepAction::Failed {
        kind: err.kind(),
        message: err.to_string(),
    }
}

/// Run the sweep every `sweep_interval` until `shutdown` flips to `true`
/// or its sender is dropped.
pub async fn run_sweeper(engine: SharedEngine, mut shutdown: watch::Receiver<bool>) {
    let period = engine.config().sweep_interval;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "Deadline sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.sweep_overdue(Utc::now(), false).await {
                    error!(error = %e, "Deadline sweep failed");
                }
                let pruned = engine.prune_locks();
                if pruned > 0 {
                    debug!(pruned, "Pruned idle issue locks");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Deadline sweeper stopping");
                    break;
                }
            }
        }
    }
}
