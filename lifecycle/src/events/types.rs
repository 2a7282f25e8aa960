//! Lifecycle events
//!
//! Published after a transition commits. Consumers (notification delivery,
//! dashboards) subscribe through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hierarchy::{OfficialId, Tier};
use crate::state::{EscalationRecord, IssueId, IssueStatus};

/// All lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Status moved along an allowed edge
    StatusChanged {
        issue_id: IssueId,
        from: IssueStatus,
        to: IssueStatus,
        tier: Tier,
        actor_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Issue moved to a higher tier
    Escalated {
        issue_id: IssueId,
        from_tier: Tier,
        to_tier: Tier,
        sequence: u32,
        reason: String,
        actor_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Handler or tier changed outside of escalation (claim or admin reassignment)
    HandlerReassigned {
        issue_id: IssueId,
        tier: Tier,
        previous_handler: Option<OfficialId>,
        handler: Option<OfficialId>,
        actor_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Response deadline pushed back
    DeadlineExtended {
        issue_id: IssueId,
        tier: Tier,
        next_escalation_at: DateTime<Utc>,
        extensions_used: u32,
        actor_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Escalation committed but its ledger entry is still missing
    AuditAppendPending {
        record: EscalationRecord,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::StatusChanged { timestamp, .. } => *timestamp,
            Self::Escalated { timestamp, .. } => *timestamp,
            Self::HandlerReassigned { timestamp, .. } => *timestamp,
            Self::DeadlineExtended { timestamp, .. } => *timestamp,
            Self::AuditAppendPending { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status_changed",
            Self::Escalated { .. } => "escalated",
            Self::HandlerReassigned { .. } => "handler_reassigned",
            Self::DeadlineExtended { .. } => "deadline_extended",
            Self::AuditAppendPending { .. } => "audit_append_pending",
        }
    }

    pub fn issue_id(&self) -> &str {
        match self {
            Self::StatusChanged { issue_id, .. }
            | Self::Escalated { issue_id, .. }
            | Self::HandlerReassigned { issue_id, .. }
            | Self::DeadlineExtended { issue_id, .. } => issue_id,
            Self::AuditAppendPending { record, .. } => &record.issue_id,
        }
    }

    /// Build the `escalated` event for a committed ledger record
    pub fn escalated(record: &EscalationRecord) -> Self {
        Self::Escalated {
            issue_id: record.issue_id.clone(),
            from_tier: record.from_tier,
            to_tier: record.to_tier,
            sequence: record.sequence,
            reason: record.reason.clone(),
            actor_id: record.actor_id.clone(),
            timestamp: record.timestamp,
        }
    }
}
