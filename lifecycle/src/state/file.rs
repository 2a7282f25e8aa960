//! JSON file backend
//!
//! ```text
//! <root>/issues/<issue_id>.json     current issue row (pretty JSON)
//! <root>/ledger/<issue_id>.jsonl    one escalation record per line
//! ```
//!
//! Issue rows are written to a temp file and renamed into place. A single
//! process-wide mutex serialises writers; this backend is meant for one
//! process (the CLI), not for a fleet.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::store::{
    check_append, AppendOutcome, EscalationLedger, IssueStore, StoreError, StoreResult,
};
use super::types::{EscalationRecord, Issue};

/// File-backed issue store and ledger
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating directories as needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("issues"))?;
        fs::create_dir_all(root.join("ledger"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn issue_path(&self, issue_id: &str) -> StoreResult<PathBuf> {
        validate_id(issue_id)?;
        Ok(self.root.join("issues").join(format!("{}.json", issue_id)))
    }

    fn ledger_path(&self, issue_id: &str) -> StoreResult<PathBuf> {
        validate_id(issue_id)?;
        Ok(self.root.join("ledger").join(format!("{}.jsonl", issue_id)))
    }

    fn read_issue(path: &Path) -> StoreResult<Option<Issue>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        let issue =
            serde_json::from_str(&json).map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(Some(issue))
    }

    fn write_issue(path: &Path, issue: &Issue) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(issue)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_ledger(path: &Path) -> StoreResult<Vec<EscalationRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| StoreError::Deserialization(e.to_string()))
            })
            .collect()
    }
}

/// Issue ids become file names; refuse anything that could escape the root.
fn validate_id(issue_id: &str) -> StoreResult<()> {
    let ok = !issue_id.is_empty()
        && issue_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::NotFound(issue_id.to_string()))
    }
}

impl IssueStore for FileStore {
    fn insert(&self, issue: &Issue) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let path = self.issue_path(&issue.id)?;
        if path.exists() {
            return Err(StoreError::AlreadyExists(issue.id.clone()));
        }
        Self::write_issue(&path, issue)
    }

    fn get(&self, issue_id: &str) -> StoreResult<Option<Issue>> {
        if validate_id(issue_id).is_err() {
            return Ok(None);
        }
        Self::read_issue(&self.issue_path(issue_id)?)
    }

    fn compare_and_put(&self, expected_version: u64, issue: &Issue) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let path = self.issue_path(&issue.id)?;
        let current =
            Self::read_issue(&path)?.ok_or_else(|| StoreError::NotFound(issue.id.clone()))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                issue_id: issue.id.clone(),
                expected: expected_version,
                found: current.version,
            });
        }
        Self::write_issue(&path, issue)
    }

    fn list(&self) -> StoreResult<Vec<Issue>> {
        let mut issues = Vec::new();
        for entry in fs::read_dir(self.root.join("issues"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(issue) = Self::read_issue(&path)? {
                issues.push(issue);
            }
        }
        Ok(issues)
    }
}

impl EscalationLedger for FileStore {
    fn append(&self, record: &EscalationRecord) -> StoreResult<AppendOutcome> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let path = self.ledger_path(&record.issue_id)?;
        let history = Self::read_ledger(&path)?;
        let existing = history.get((record.sequence as usize).wrapping_sub(1));
        let outcome = check_append(existing, history.len(), record)?;

        if outcome == AppendOutcome::Appended {
            let line = serde_json::to_string(record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{}", line)?;
            file.sync_data()?;
        }
        Ok(outcome)
    }

    fn history(&self, issue_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        if validate_id(issue_id).is_err() {
            return Ok(Vec::new());
        }
        Self::read_ledger(&self.ledger_path(issue_id)?)
    }
}
