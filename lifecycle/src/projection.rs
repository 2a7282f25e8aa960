//! Read-only projections for tier dashboards
//!
//! Pure functions over issue snapshots. Nothing here takes a lock or
//! writes; callers pass in what the store returned.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::escalation::Actor;
use crate::hierarchy::{Jurisdiction, Tier};
use crate::state::{EscalationRecord, Issue, IssueStatus};

/// Counters shown at the top of a dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: usize,
    /// Pending or in progress
    pub open: usize,
    /// Resolved or closed
    pub resolved: usize,
    /// Issues the viewer currently handles (citizens: issues they reported)
    pub assigned_to_viewer: usize,
}

/// An issue that left a tier, with the most recent escalation on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalatedIssue {
    pub issue: Issue,
    pub latest_escalation: EscalationRecord,
}

fn no_dashboard() -> EngineError {
    EngineError::Unauthorized {
        reason: "Citizens do not have a tier dashboard.".to_string(),
    }
}

/// Whether a viewer at `tier` with `scope` may see `issue`'s area.
fn in_scope(issue: &Issue, tier: Tier, scope: &Jurisdiction) -> bool {
    if tier == Tier::Admin {
        scope.contains(&issue.location)
    } else {
        scope.covers(&issue.location, tier)
    }
}

/// `ListIssuesForTier`: issues at `actor_tier` inside `scope`, newest first.
pub fn issues_for_tier(
    issues: Vec<Issue>,
    actor_tier: Tier,
    scope: &Jurisdiction,
    statuses: &[IssueStatus],
) -> EngineResult<Vec<Issue>> {
    if actor_tier == Tier::Citizen {
        return Err(no_dashboard());
    }

    let mut visible: Vec<Issue> = issues
        .into_iter()
        .filter(|issue| actor_tier == Tier::Admin || issue.tier == actor_tier)
        .filter(|issue| in_scope(issue, actor_tier, scope))
        .filter(|issue| statuses.is_empty() || statuses.contains(&issue.status))
        .collect();

    visible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(visible)
}

/// Counters over every issue in the viewer's area, at any tier.
///
/// Citizens get counters over the issues they submitted.
pub fn dashboard_stats(
    issues: &[Issue],
    viewer: &Actor,
    scope: &Jurisdiction,
) -> EngineResult<DashboardStats> {
    let relevant: Vec<&Issue> = if viewer.is_admin() {
        issues
            .iter()
            .filter(|i| in_scope(i, Tier::Admin, scope))
            .collect()
    } else if viewer.tier == Tier::Citizen {
        issues
            .iter()
            .filter(|i| i.submitter.as_deref() == Some(viewer.id.as_str()))
            .collect()
    } else {
        issues
            .iter()
            .filter(|i| in_scope(i, viewer.tier, scope))
            .collect()
    };

    let assigned_to_viewer = if viewer.tier == Tier::Citizen {
        relevant.len()
    } else {
        relevant
            .iter()
            .filter(|i| i.handler.as_deref() == Some(viewer.id.as_str()))
            .count()
    };

    Ok(DashboardStats {
        total: relevant.len(),
        open: relevant.iter().filter(|i| i.status.is_open()).count(),
        resolved: relevant
            .iter()
            .filter(|i| matches!(i.status, IssueStatus::Resolved | IssueStatus::Closed))
            .count(),
        assigned_to_viewer,
    })
}

/// Issues escalated out of `tier` within `scope`, most recently escalated first.
///
/// `history` returns an issue's ledger in sequence order.
pub fn escalated_from<F>(
    issues: Vec<Issue>,
    tier: Tier,
    scope: &Jurisdiction,
    history: F,
) -> EngineResult<Vec<EscalatedIssue>>
where
    F: Fn(&str) -> EngineResult<Vec<EscalationRecord>>,
{
    if tier == Tier::Citizen {
        return Err(no_dashboard());
    }

    let mut out = Vec::new();
    for issue in issues {
        if issue.escalation_count == 0 || !in_scope(&issue, tier, scope) {
            continue;
        }
        let records = history(&issue.id)?;
        if !records.iter().any(|r| r.from_tier == tier) {
            continue;
        }
        if let Some(latest) = records.into_iter().last() {
            out.push(EscalatedIssue {
                issue,
                latest_escalation: latest,
            });
        }
    }

    out.sort_by(|a, b| {
        b.latest_escalation
            .timestamp
            .cmp(&a.latest_escalation.timestamp)
    });
    Ok(out)
}
