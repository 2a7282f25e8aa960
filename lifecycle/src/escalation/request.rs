//! Actors and transition requests
//!
//! The identity layer supplies `(id, tier, is_admin)` for every call; the
//! engine trusts it and does not re-authenticate.

use serde::{Deserialize, Serialize};

use crate::hierarchy::{OfficialId, Tier};
use crate::state::{IssueId, IssueStatus};

/// Identifier of the built-in administrator used by the deadline sweep
pub const SYSTEM_ACTOR_ID: &str = "system";

/// Authenticated caller acting on an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub tier: Tier,
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, tier: Tier, is_admin: bool) -> Self {
        Self {
            id: id.into(),
            tier,
            is_admin,
        }
    }

    pub fn official(id: impl Into<String>, tier: Tier) -> Self {
        Self::new(id, tier, false)
    }

    pub fn citizen(id: impl Into<String>) -> Self {
        Self::new(id, Tier::Citizen, false)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Tier::Admin, true)
    }

    /// The administrator identity used for automatic escalations
    pub fn system() -> Self {
        Self::admin(SYSTEM_ACTOR_ID)
    }

    /// Admin flag or the orthogonal `admin` tier
    pub fn is_admin(&self) -> bool {
        self.is_admin || self.tier == Tier::Admin
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_admin() {
            write!(f, "{}@{}(admin)", self.id, self.tier)
        } else {
            write!(f, "{}@{}", self.id, self.tier)
        }
    }
}

/// What a request asks the engine to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestedChange {
    /// Move along a status edge
    Status { to: IssueStatus },
    /// Move to the next tier, or to `target` (admins only)
    Escalate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Tier>,
    },
    /// Push the response deadline back by `days`
    ExtendDeadline { days: u32 },
    /// Administrative move to any ladder tier with an optional handler
    Reassign {
        tier: Tier,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handler: Option<OfficialId>,
    },
}

impl RequestedChange {
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status_change",
            Self::Escalate { .. } => "escalation",
            Self::ExtendDeadline { .. } => "extension",
            Self::Reassign { .. } => "reassignment",
        }
    }
}

/// Ephemeral input to [`EscalationEngine::apply`](super::EscalationEngine::apply)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub issue_id: IssueId,
    pub change: RequestedChange,
    /// Required for escalation, optional otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub actor: Actor,
}

impl TransitionRequest {
    pub fn status(issue_id: impl Into<IssueId>, to: IssueStatus, actor: Actor) -> Self {
        Self {
            issue_id: issue_id.into(),
            change: RequestedChange::Status { to },
            reason: None,
            actor,
        }
    }

    pub fn escalate(issue_id: impl Into<IssueId>, reason: impl Into<String>, actor: Actor) -> Self {
        Self {
            issue_id: issue_id.into(),
            change: RequestedChange::Escalate { target: None },
            reason: Some(reason.into()),
            actor,
        }
    }

    pub fn escalate_to(
        issue_id: impl Into<IssueId>,
        target: Tier,
        reason: impl Into<String>,
        actor: Actor,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            change: RequestedChange::Escalate {
                target: Some(target),
            },
            reason: Some(reason.into()),
            actor,
        }
    }

    pub fn extend(issue_id: impl Into<IssueId>, days: u32, actor: Actor) -> Self {
        Self {
            issue_id: issue_id.into(),
            change: RequestedChange::ExtendDeadline { days },
            reason: None,
            actor,
        }
    }

    pub fn reassign(
        issue_id: impl Into<IssueId>,
        tier: Tier,
        handler: Option<OfficialId>,
        actor: Actor,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            change: RequestedChange::Reassign { tier, handler },
            reason: None,
            actor,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Trimmed, non-empty reason
    pub fn reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}
