//! Transition authority: who may move an issue, and where to
//!
//! Rules are evaluated in order and the first violation wins:
//!
//! 1. Actor eligibility (admin, pool member at the issue's tier, or the
//!    current handler for non-escalation changes)
//! 2. Status edge legality; `resolved -> closed` additionally needs a
//!    district-level actor
//! 3. Escalation legality
//!
//! The close condition is reported ahead of rule 1 when the edge itself is
//! legal, so a junior official sees why the close failed rather than a
//! generic area mismatch.
//!
//! Evaluation is pure: the resulting state is a function of the snapshot,
//! the request and the supplied clock value.

use chrono::{DateTime, Duration, Utc};

use crate::error::{ErrorKind, Rejection};
use crate::hierarchy::{SharedDirectory, Tier};
use crate::state::{EscalationRecord, Issue, IssueStatus};

use super::request::{Actor, RequestedChange, TransitionRequest};

/// Rejection text for closing below district level
pub const CLOSE_REQUIRES_DISTRICT: &str =
    "Only district-level officials or higher may close an issue.";

/// Allowed status edges.
///
/// ```text
/// pending     → in_progress | resolved
/// in_progress → resolved | pending
/// resolved    → closed | in_progress
/// closed      → (admin override only)
/// ```
///
/// `escalated` never appears: escalation is its own request kind and lands
/// on `pending` at the new tier.
pub fn is_allowed_edge(from: IssueStatus, to: IssueStatus) -> bool {
    use IssueStatus::*;

    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Resolved)
            | (InProgress, Resolved)
            | (InProgress, Pending)
            | (Resolved, Closed)
            // Reopen
            | (Resolved, InProgress)
    )
}

/// Statuses an administrator may restore a closed issue to
fn is_admin_reopen_target(to: IssueStatus) -> bool {
    matches!(
        to,
        IssueStatus::Pending | IssueStatus::InProgress | IssueStatus::Resolved
    )
}

/// Accepted outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Issue row to write (version already bumped)
    pub next: Issue,
    /// Ledger entry to append, for escalations only
    pub escalation: Option<EscalationRecord>,
}

/// Outcome of [`TransitionAuthority::validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow(Box<Transition>),
    Reject(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn into_result(self) -> Result<Transition, Rejection> {
        match self {
            Self::Allow(transition) => Ok(*transition),
            Self::Reject(rejection) => Err(rejection),
        }
    }
}

/// Rule engine over the hierarchy directory
pub struct TransitionAuthority {
    directory: SharedDirectory,
    max_pending_extensions: u32,
}

impl TransitionAuthority {
    pub fn new(directory: SharedDirectory, max_pending_extensions: u32) -> Self {
        Self {
            directory,
            max_pending_extensions,
        }
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    /// Decide whether `request` may be applied to `issue` at `now`.
    pub fn validate(
        &self,
        issue: &Issue,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Decision {
        let outcome = self.check_eligibility(issue, request).and_then(|()| {
            let actor = &request.actor;
            match &request.change {
                RequestedChange::Status { to } => self.status_change(issue, *to, actor, now),
                RequestedChange::Escalate { target } => {
                    self.escalation(issue, *target, request, now)
                }
                RequestedChange::ExtendDeadline { days } => self.extension(issue, *days, now),
                RequestedChange::Reassign { tier, handler } => {
                    self.reassignment(issue, *tier, handler.as_deref(), now)
                }
            }
        });

        match outcome {
            Ok(transition) => Decision::Allow(Box::new(transition)),
            Err(rejection) => Decision::Reject(rejection),
        }
    }

    // =========================================================================
    // Rule 1: actor eligibility
    // =========================================================================

    fn check_eligibility(&self, issue: &Issue, request: &TransitionRequest) -> Result<(), Rejection> {
        let actor = &request.actor;
        if actor.is_admin() {
            return Ok(());
        }

        match &request.change {
            RequestedChange::Reassign { .. } => {
                return Err(unauthorized("Only administrators may reassign an issue."));
            }
            RequestedChange::Status {
                to: IssueStatus::Closed,
            } if is_allowed_edge(issue.status, IssueStatus::Closed)
                && !may_close(actor) =>
            {
                return Err(unauthorized(CLOSE_REQUIRES_DISTRICT));
            }
            _ => {}
        }

        if !actor.tier.is_official() {
            return Err(unauthorized(
                "Citizens cannot change the status of an issue or escalate it.",
            ));
        }

        if actor.tier == issue.tier
            && self
                .directory
                .is_in_pool(&actor.id, issue.tier, &issue.location)
        {
            return Ok(());
        }

        let is_handler = issue.handler.as_deref() == Some(actor.id.as_str());
        if is_handler && !request.change.is_escalation() {
            return Ok(());
        }

        if actor.tier != issue.tier {
            Err(unauthorized(format!(
                "This issue is handled at the {} tier; {} officials cannot act on it.",
                issue.tier, actor.tier
            )))
        } else {
            Err(unauthorized(format!(
                "Official {} is not responsible for this issue's area.",
                actor.id
            )))
        }
    }

    // =========================================================================
    // Rule 2: status edges
    // =========================================================================

    fn status_change(
        &self,
        issue: &Issue,
        to: IssueStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Transition, Rejection> {
        let from = issue.status;

        if to == IssueStatus::Escalated {
            return Err(invalid_transition(
                "Issues are escalated through an escalation request, not a status change.",
            ));
        }
        if from == to {
            return Err(invalid_transition(format!("The issue is already {}.", from)));
        }

        let legal = if from == IssueStatus::Closed {
            actor.is_admin() && is_admin_reopen_target(to)
        } else {
            is_allowed_edge(from, to)
        };
        if !legal {
            let reason = if from == IssueStatus::Closed {
                "The issue is closed; only an administrator can reopen it.".to_string()
            } else {
                format!("An issue cannot move from {} to {}.", from, to)
            };
            return Err(invalid_transition(reason));
        }
        if to == IssueStatus::Closed && !may_close(actor) {
            return Err(unauthorized(CLOSE_REQUIRES_DISTRICT));
        }

        let mut next = issue.clone();
        next.status = to;

        if next.handler.is_none()
            && !actor.is_admin()
            && actor.tier == issue.tier
            && self
                .directory
                .is_in_pool(&actor.id, issue.tier, &issue.location)
        {
            next.handler = Some(actor.id.clone());
        }

        match to {
            IssueStatus::Resolved => next.resolved_at = Some(now),
            IssueStatus::Closed => next.resolved_at = issue.resolved_at.or(Some(now)),
            _ => next.resolved_at = None,
        }

        next.next_escalation_at = if to.is_open() {
            Some(self.deadline(issue.tier, now)?)
        } else {
            None
        };

        Ok(Transition {
            next: stamp(next, now),
            escalation: None,
        })
    }

    // =========================================================================
    // Rule 3: escalation
    // =========================================================================

    fn escalation(
        &self,
        issue: &Issue,
        target: Option<Tier>,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<Transition, Rejection> {
        let actor = &request.actor;

        let next_tier = self.directory.next_tier(issue.tier).ok_or_else(|| {
            Rejection::new(
                ErrorKind::NoFurtherEscalation,
                format!(
                    "The issue is already at the highest tier ({}) and cannot be escalated further.",
                    issue.tier
                ),
            )
        })?;

        if !issue.status.is_open() {
            return Err(invalid_transition(format!(
                "Only pending or in-progress issues can be escalated; this issue is {}.",
                issue.status
            )));
        }

        let reason = request.reason().ok_or_else(|| {
            Rejection::new(
                ErrorKind::MissingReason,
                "A reason is required to escalate an issue.",
            )
        })?;

        let to_tier = match target {
            None => next_tier,
            Some(t) if t == next_tier => t,
            Some(t) => {
                if !actor.is_admin() {
                    return Err(unauthorized(format!(
                        "Only administrators may escalate past the next tier ({}).",
                        next_tier
                    )));
                }
                if !self.directory.is_ladder_tier(t) || !t.is_above(issue.tier) {
                    return Err(invalid_request(format!(
                        "Escalation target {} must be a configured tier above {}.",
                        t, issue.tier
                    )));
                }
                t
            }
        };

        let sequence = issue.escalation_count + 1;
        let record = EscalationRecord {
            issue_id: issue.id.clone(),
            sequence,
            from_tier: issue.tier,
            to_tier,
            reason: reason.to_string(),
            actor_id: actor.id.clone(),
            actor_tier: actor.tier,
            timestamp: now,
        };

        let mut next = issue.clone();
        next.status = IssueStatus::Pending;
        next.tier = to_tier;
        next.handler = None;
        next.escalation_count = sequence;
        next.pending_extension_count = 0;
        next.resolved_at = None;
        next.next_escalation_at = Some(self.deadline(to_tier, now)?);

        Ok(Transition {
            next: stamp(next, now),
            escalation: Some(record),
        })
    }

    // =========================================================================
    // Deadline extension and administrative reassignment
    // =========================================================================

    fn extension(&self, issue: &Issue, days: u32, now: DateTime<Utc>) -> Result<Transition, Rejection> {
        if !issue.status.is_open() {
            return Err(invalid_transition(format!(
                "Only open issues have a response deadline; this issue is {}.",
                issue.status
            )));
        }
        if days == 0 {
            return Err(invalid_request("An extension must be at least one day."));
        }
        if issue.pending_extension_count >= self.max_pending_extensions {
            return Err(Rejection::new(
                ErrorKind::ExtensionLimitReached,
                format!(
                    "The deadline has already been extended {} time(s) at the {} tier; respond or escalate instead.",
                    issue.pending_extension_count, issue.tier
                ),
            ));
        }

        let due = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| invalid_request(format!("An extension of {} days is out of range.", days)))?;

        let mut next = issue.clone();
        next.next_escalation_at = Some(due);
        next.pending_extension_count += 1;

        Ok(Transition {
            next: stamp(next, now),
            escalation: None,
        })
    }

    fn reassignment(
        &self,
        issue: &Issue,
        tier: Tier,
        handler: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transition, Rejection> {
        if !self.directory.is_ladder_tier(tier) {
            return Err(invalid_request(format!(
                "{} is not a handling tier of the configured hierarchy.",
                tier
            )));
        }
        if issue.status == IssueStatus::Closed {
            return Err(invalid_transition(
                "A closed issue cannot be reassigned; reopen it first.",
            ));
        }
        if let Some(official) = handler {
            if !self.directory.is_in_pool(official, tier, &issue.location) {
                return Err(invalid_request(format!(
                    "Official {} is not in the {} pool for this issue's area.",
                    official, tier
                )));
            }
        }

        let mut next = issue.clone();
        next.tier = tier;
        next.handler = handler.map(str::to_string);
        if tier != issue.tier {
            next.pending_extension_count = 0;
        }
        if issue.status.is_open() {
            next.next_escalation_at = Some(self.deadline(tier, now)?);
        }

        Ok(Transition {
            next: stamp(next, now),
            escalation: None,
        })
    }

    /// Response deadline for a tier entered at `now`
    fn deadline(&self, tier: Tier, now: DateTime<Utc>) -> Result<DateTime<Utc>, Rejection> {
        now.checked_add_signed(self.directory.response_window(tier))
            .ok_or_else(|| {
                invalid_request(format!(
                    "The configured response window for {} is out of range.",
                    tier
                ))
            })
    }
}

fn may_close(actor: &Actor) -> bool {
    actor.is_admin() || actor.tier.is_at_least(Tier::DistrictSecretary)
}

fn stamp(mut issue: Issue, now: DateTime<Utc>) -> Issue {
    issue.updated_at = now;
    issue.version += 1;
    issue
}

fn unauthorized(reason: impl Into<String>) -> Rejection {
    Rejection::new(ErrorKind::Unauthorized, reason)
}

fn invalid_transition(reason: impl Into<String>) -> Rejection {
    Rejection::new(ErrorKind::InvalidStatusTransition, reason)
}

fn invalid_request(reason: impl Into<String>) -> Rejection {
    Rejection::new(ErrorKind::InvalidRequest, reason)
}
