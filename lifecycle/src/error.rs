//! Engine error types
//!
//! Every failure of a lifecycle operation maps to one [`ErrorKind`]. Rule
//! violations carry a human-readable reason meant for display as-is.
//! [`EngineError::to_structured`] renders the error with a recovery hint for
//! API layers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{EscalationRecord, Issue, StoreError};

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Machine-readable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    InvalidStatusTransition,
    NoFurtherEscalation,
    MissingReason,
    ExtensionLimitReached,
    InvalidRequest,
    Busy,
    PartialEscalation,
    NotFound,
    Store,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidStatusTransition => "INVALID_STATUS_TRANSITION",
            Self::NoFurtherEscalation => "NO_FURTHER_ESCALATION",
            Self::MissingReason => "MISSING_REASON",
            Self::ExtensionLimitReached => "EXTENSION_LIMIT_REACHED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Busy => "BUSY",
            Self::PartialEscalation => "PARTIAL_ESCALATION",
            Self::NotFound => "NOT_FOUND",
            Self::Store => "STORE_ERROR",
        }
    }

    /// Only lock contention and pending audit appends are worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Busy | Self::PartialEscalation)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A rule violation reported by the transition authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: ErrorKind,
    pub reason: String,
}

impl Rejection {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Errors returned by lifecycle operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Actor lacks rights for the requested transition
    #[error("{reason}")]
    Unauthorized { reason: String },

    /// Edge not permitted from the current status
    #[error("{reason}")]
    InvalidStatusTransition { reason: String },

    /// Issue already at the top of the ladder
    #[error("{reason}")]
    NoFurtherEscalation { reason: String },

    /// Escalation without justification
    #[error("{reason}")]
    MissingReason { reason: String },

    /// Deadline extensions used up at this tier
    #[error("{reason}")]
    ExtensionLimitReached { reason: String },

    /// Malformed request (bad target tier, handler outside pool, zero days)
    #[error("{reason}")]
    InvalidRequest { reason: String },

    /// Per-issue lock not acquired in time
    #[error("Issue {issue_id} is busy: lock not acquired within {waited_ms}ms")]
    Busy { issue_id: String, waited_ms: u64 },

    /// State advanced but the audit entry could not be appended
    #[error(
        "Issue {} escalated {} -> {} but the audit entry is pending after {attempts} attempt(s): {last_error}",
        record.issue_id, record.from_tier, record.to_tier
    )]
    PartialEscalation {
        issue: Box<Issue>,
        record: EscalationRecord,
        attempts: u32,
        last_error: String,
    },

    /// Unknown issue id
    #[error("Issue not found: {0}")]
    NotFound(String),

    /// Opaque infrastructure failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<Rejection> for EngineError {
    fn from(rejection: Rejection) -> Self {
        let reason = rejection.reason;
        match rejection.kind {
            ErrorKind::Unauthorized => Self::Unauthorized { reason },
            ErrorKind::InvalidStatusTransition => Self::InvalidStatusTransition { reason },
            ErrorKind::NoFurtherEscalation => Self::NoFurtherEscalation { reason },
            ErrorKind::MissingReason => Self::MissingReason { reason },
            ErrorKind::ExtensionLimitReached => Self::ExtensionLimitReached { reason },
            // Remaining kinds are never produced by rule evaluation
            _ => Self::InvalidRequest { reason },
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InvalidStatusTransition { .. } => ErrorKind::InvalidStatusTransition,
            Self::NoFurtherEscalation { .. } => ErrorKind::NoFurtherEscalation,
            Self::MissingReason { .. } => ErrorKind::MissingReason,
            Self::ExtensionLimitReached { .. } => ErrorKind::ExtensionLimitReached,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::PartialEscalation { .. } => ErrorKind::PartialEscalation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Convert to a structured error for API responses
    pub fn to_structured(&self) -> StructuredError {
        let kind = self.kind();
        let recovery = match self {
            Self::Unauthorized { .. } => {
                "Ask an official of the issue's current tier and jurisdiction, or an administrator"
            }
            Self::InvalidStatusTransition { .. } => {
                "Fetch the current state and request a transition allowed from it"
            }
            Self::NoFurtherEscalation { .. } => {
                "The issue is at the highest tier; resolve it there or ask an administrator"
            }
            Self::MissingReason { .. } => "Provide a non-empty reason for the escalation",
            Self::ExtensionLimitReached { .. } => {
                "Respond to the issue or escalate it; no more extensions are allowed at this tier"
            }
            Self::InvalidRequest { .. } => "Correct the request parameters and resubmit",
            Self::Busy { .. } => "Retry the request after a short delay",
            Self::PartialEscalation { .. } => {
                "The issue state already changed; retry only the audit append with the included record"
            }
            Self::NotFound(_) => "Check the issue id",
            Self::Store(_) => "Retry later; the issue state was not modified",
        };

        let mut error = StructuredError::new(kind.code(), self.to_string(), recovery);
        if kind.is_retryable() {
            error = error.retryable();
        }

        match self {
            Self::Busy { issue_id, waited_ms } => error
                .with_context("issue_id", issue_id.clone())
                .with_context("waited_ms", *waited_ms),
            Self::PartialEscalation {
                record, attempts, ..
            } => {
                let record_json = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
                error
                    .with_context("issue_id", record.issue_id.clone())
                    .with_context("attempts", *attempts)
                    .with_context("record", record_json)
            }
            Self::NotFound(issue_id) => error.with_context("issue_id", issue_id.clone()),
            _ => error,
        }
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Serializable error body for API layers.
///
/// ```json
/// {
///   "code": "UNAUTHORIZED",
///   "message": "Only district-level officials or higher may close an issue.",
///   "recovery_action": "Ask an official of the issue's current tier and jurisdiction, or an administrator"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// What the caller can do about it
    pub recovery_action: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}
