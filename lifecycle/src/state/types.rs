//! Core types for issue state persistence
//!
//! These are the records held by the issue store and the escalation ledger.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hierarchy::{Location, OfficialId, Tier};

/// Unique identifier for issues
pub type IssueId = String;

/// Lifecycle status of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Waiting for the current tier to act
    Pending,
    /// Being worked on at the current tier
    InProgress,
    /// Fixed, awaiting closure or reopen
    Resolved,
    /// Terminal
    Closed,
    /// Escalation in flight. Never stored.
    Escalated,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Escalated => "escalated",
        }
    }

    /// Pending or in progress: the response deadline is running.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "escalated" => Ok(Self::Escalated),
            other => Err(format!("Unknown issue status: {}", other)),
        }
    }
}

/// Issue priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("Unknown priority: {}", other)),
        }
    }
}

/// Grievance category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Infrastructure,
    Utilities,
    Transportation,
    Healthcare,
    Education,
    Environment,
    PublicSafety,
    #[default]
    Other,
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "infrastructure" => Ok(Self::Infrastructure),
            "utilities" => Ok(Self::Utilities),
            "transportation" => Ok(Self::Transportation),
            "healthcare" => Ok(Self::Healthcare),
            "education" => Ok(Self::Education),
            "environment" => Ok(Self::Environment),
            "public_safety" => Ok(Self::PublicSafety),
            "other" => Ok(Self::Other),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

/// One citizen grievance and its current handling state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    /// Public reference, e.g. `GS2026A1B2C3D4`
    pub reference_number: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: IssueStatus,
    /// Tier currently responsible for the issue
    pub tier: Tier,
    /// Official from the current tier's pool, if assigned
    pub handler: Option<OfficialId>,
    /// Completed escalations; equals the ledger length
    pub escalation_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// When the deadline sweep will escalate the issue if nobody responds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_escalation_at: Option<DateTime<Utc>>,
    /// Deadline extensions granted at the current tier
    #[serde(default)]
    pub pending_extension_count: u32,
    /// Submitting citizen, `None` for anonymous reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    pub location: Location,
    /// Store version for compare-and-swap writes
    #[serde(default)]
    pub version: u64,
}

/// Read-only copy of an issue handed to callers
pub type IssueSnapshot = Issue;

impl Issue {
    /// Build the initial row for an intake submission:
    /// `pending` at `entry_tier`, unassigned, deadline running.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        location: Location,
        entry_tier: Tier,
        response_window: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reference_number: generate_reference_number(now),
            title: title.into(),
            description: description.into(),
            category: Category::default(),
            priority: Priority::default(),
            status: IssueStatus::Pending,
            tier: entry_tier,
            handler: None,
            escalation_count: 0,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            next_escalation_at: Some(now + response_window),
            pending_extension_count: 0,
            submitter: None,
            location,
            version: 0,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.submitter.is_none()
    }

    /// Whether the response deadline has passed at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.next_escalation_at.is_some_and(|due| due <= now)
    }

    /// One-line summary for logging
    pub fn summary(&self) -> String {
        format!(
            "issue={} ref={} status={} tier={} handler={} escalations={}",
            self.id,
            self.reference_number,
            self.status,
            self.tier,
            self.handler.as_deref().unwrap_or("-"),
            self.escalation_count,
        )
    }
}

/// `GS{year}{8 uppercase hex}`
pub fn generate_reference_number(now: DateTime<Utc>) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("GS{}{}", now.year(), hex[..8].to_uppercase())
}

/// One completed escalation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub issue_id: IssueId,
    /// 1-based position in this issue's ledger
    pub sequence: u32,
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub reason: String,
    pub actor_id: String,
    /// Tier the actor held when escalating
    pub actor_tier: Tier,
    pub timestamp: DateTime<Utc>,
}

impl EscalationRecord {
    /// Idempotency key: a retried append with the same key is a no-op.
    pub fn idempotency_key(&self) -> (&str, Tier, Tier, DateTime<Utc>) {
        (&self.issue_id, self.from_tier, self.to_tier, self.timestamp)
    }

    pub fn same_event(&self, other: &EscalationRecord) -> bool {
        self.idempotency_key() == other.idempotency_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Location {
        Location::new("western", "colombo", "thimbirigasyaya", "kollupitiya")
    }

    #[test]
    fn test_new_issue_initial_state() {
        let issue = Issue::new(
            "Broken culvert",
            "Road floods after rain",
            location(),
            Tier::GramaNiladhari,
            Duration::days(3),
        );
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.tier, Tier::GramaNiladhari);
        assert!(issue.handler.is_none());
        assert_eq!(issue.escalation_count, 0);
        assert!(issue.is_anonymous());
        assert_eq!(
            issue.next_escalation_at,
            Some(issue.created_at + Duration::days(3))
        );
    }

    #[test]
    fn test_reference_number_format() {
        let now = Utc::now();
        let reference = generate_reference_number(now);
        assert!(reference.starts_with(&format!("GS{}", now.year())));
        assert_eq!(reference.len(), 2 + 4 + 8);
        assert!(reference[6..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_overdue_only_when_open() {
        let mut issue = Issue::new("t", "d", location(), Tier::GramaNiladhari, Duration::days(3));
        let later = issue.created_at + Duration::days(4);
        assert!(issue.is_overdue(later));
        assert!(!issue.is_overdue(issue.created_at));

        issue.status = IssueStatus::Resolved;
        assert!(!issue.is_overdue(later));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("in-progress".parse::<IssueStatus>(), Ok(IssueStatus::InProgress));
        assert!("open".parse::<IssueStatus>().is_err());
        assert_eq!("public_safety".parse::<Category>(), Ok(Category::PublicSafety));
        assert_eq!("URGENT".parse::<Priority>(), Ok(Priority::Urgent));
    }

    #[test]
    fn test_record_idempotency_key_ignores_reason() {
        let record = EscalationRecord {
            issue_id: "i-1".into(),
            sequence: 1,
            from_tier: Tier::GramaNiladhari,
            to_tier: Tier::DivisionalSecretary,
            reason: "needs funding".into(),
            actor_id: "gn-1".into(),
            actor_tier: Tier::GramaNiladhari,
            timestamp: Utc::now(),
        };
        let mut retry = record.clone();
        retry.reason = "retried".into();
        assert!(record.same_event(&retry));

        retry.to_tier = Tier::DistrictSecretary;
        assert!(!record.same_event(&retry));
    }
}
