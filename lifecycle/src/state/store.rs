//! Store traits and the in-memory backend
//!
//! `IssueStore` holds current issue state and supports compare-and-swap on
//! the row version. `EscalationLedger` is append-only; appends are
//! idempotent on [`EscalationRecord::idempotency_key`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::types::{EscalationRecord, Issue, IssueId};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "heavy-state")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Issue already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict on {issue_id}: expected {expected}, found {found}")]
    VersionConflict {
        issue_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Ledger conflict on {issue_id} at sequence {sequence}: {message}")]
    LedgerConflict {
        issue_id: String,
        sequence: u32,
        message: String,
    },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// What a ledger append did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New entry written
    Appended,
    /// Same event already present; nothing written
    AlreadyPresent,
}

/// Durable record of current issue state
pub trait IssueStore: Send + Sync {
    /// Insert a new issue (intake path). Fails if the id exists.
    fn insert(&self, issue: &Issue) -> StoreResult<()>;

    fn get(&self, issue_id: &str) -> StoreResult<Option<Issue>>;

    /// Replace an issue if its stored version equals `expected_version`.
    /// The written row carries `issue.version` as given.
    fn compare_and_put(&self, expected_version: u64, issue: &Issue) -> StoreResult<()>;

    fn list(&self) -> StoreResult<Vec<Issue>>;
}

/// Append-only escalation history
pub trait EscalationLedger: Send + Sync {
    /// Append one record at `record.sequence`.
    ///
    /// Re-appending the same event is a no-op; a different event at an
    /// occupied sequence, or a gap in the sequence, is a conflict.
    fn append(&self, record: &EscalationRecord) -> StoreResult<AppendOutcome>;

    /// All records for an issue, ordered by sequence.
    fn history(&self, issue_id: &str) -> StoreResult<Vec<EscalationRecord>>;
}

/// Shared reference to an issue store
pub type SharedIssueStore = Arc<dyn IssueStore>;

/// Shared reference to a ledger
pub type SharedLedger = Arc<dyn EscalationLedger>;

/// Ledger append rule shared by every backend: `existing` is the record at
/// `record.sequence` (if any) and `len` the current history length.
pub(crate) fn check_append(
    existing: Option<&EscalationRecord>,
    len: usize,
    record: &EscalationRecord,
) -> StoreResult<AppendOutcome> {
    match existing {
        Some(current) if current.same_event(record) => Ok(AppendOutcome::AlreadyPresent),
        Some(current) => Err(StoreError::LedgerConflict {
            issue_id: record.issue_id.clone(),
            sequence: record.sequence,
            message: format!(
                "occupied by {} -> {} at {}",
                current.from_tier, current.to_tier, current.timestamp
            ),
        }),
        None if record.sequence as usize != len + 1 => Err(StoreError::LedgerConflict {
            issue_id: record.issue_id.clone(),
            sequence: record.sequence,
            message: format!("expected sequence {}", len + 1),
        }),
        None => Ok(AppendOutcome::Appended),
    }
}

/// In-memory issue store
#[derive(Default)]
pub struct MemoryIssueStore {
    issues: RwLock<HashMap<IssueId, Issue>>,
}

impl MemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedIssueStore {
        Arc::new(self)
    }
}

impl IssueStore for MemoryIssueStore {
    fn insert(&self, issue: &Issue) -> StoreResult<()> {
        let mut issues = self.issues.write().map_err(|_| StoreError::LockPoisoned)?;
        if issues.contains_key(&issue.id) {
            return Err(StoreError::AlreadyExists(issue.id.clone()));
        }
        issues.insert(issue.id.clone(), issue.clone());
        Ok(())
    }

    fn get(&self, issue_id: &str) -> StoreResult<Option<Issue>> {
        let issues = self.issues.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(issues.get(issue_id).cloned())
    }

    fn compare_and_put(&self, expected_version: u64, issue: &Issue) -> StoreResult<()> {
        let mut issues = self.issues.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = issues
            .get_mut(&issue.id)
            .ok_or_else(|| StoreError::NotFound(issue.id.clone()))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                issue_id: issue.id.clone(),
                expected: expected_version,
                found: current.version,
            });
        }
        *current = issue.clone();
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<Issue>> {
        let issues = self.issues.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(issues.values().cloned().collect())
    }
}

/// In-memory escalation ledger
#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<IssueId, Vec<EscalationRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedLedger {
        Arc::new(self)
    }
}

impl EscalationLedger for MemoryLedger {
    fn append(&self, record: &EscalationRecord) -> StoreResult<AppendOutcome> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let history = entries.entry(record.issue_id.clone()).or_default();
        let existing = history.get((record.sequence as usize).wrapping_sub(1));
        let outcome = check_append(existing, history.len(), record)?;
        if outcome == AppendOutcome::Appended {
            history.push(record.clone());
        }
        Ok(outcome)
    }

    fn history(&self, issue_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(issue_id).cloned().unwrap_or_default())
    }
}
