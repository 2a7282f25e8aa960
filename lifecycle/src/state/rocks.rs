//! RocksDB-backed issue store and ledger
//!
//! Column families separate issue rows from ledger entries. Both are stored
//! as JSON: issue rows skip empty optional fields, which a positional
//! binary encoding cannot round-trip.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{de::DeserializeOwned, Serialize};

use super::schema::{self, ALL_CFS};
use super::store::{
    check_append, AppendOutcome, EscalationLedger, IssueStore, StoreError, StoreResult,
};
use super::types::{EscalationRecord, Issue};

/// RocksDB-backed persistent store
pub struct RocksStore {
    db: RwLock<DB>,
    /// Serialises read-check-write sequences (insert, CAS, append)
    write_lock: Mutex<()>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            write_lock: Mutex::new(()),
            path,
        })
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Generic operations
    // =========================================================================

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> StoreResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put_raw(cf_name, key, bytes)
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> StoreResult<Option<T>> {
        match self.get_raw(cf_name, key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_raw(&self, cf_name: &str, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        db.put_cf(&cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get_raw(&self, cf_name: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;
        Ok(db.get_cf(&cf, key.as_bytes())?)
    }

    /// All values under a key prefix, in key order
    fn scan_prefix(&self, cf_name: &str, prefix: &str) -> StoreResult<Vec<Vec<u8>>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut values = Vec::new();
        let iter = db.iterator_cf(
            &cf,
            rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );
        for result in iter {
            let (key, value) = result?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            values.push(value.to_vec());
        }
        Ok(values)
    }
}

impl IssueStore for RocksStore {
    fn insert(&self, issue: &Issue) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let key = schema::keys::issue(&issue.id);
        if self.get_raw(schema::CF_ISSUES, &key)?.is_some() {
            return Err(StoreError::AlreadyExists(issue.id.clone()));
        }
        self.put_json(schema::CF_ISSUES, &key, issue)
    }

    fn get(&self, issue_id: &str) -> StoreResult<Option<Issue>> {
        self.get_json(schema::CF_ISSUES, &schema::keys::issue(issue_id))
    }

    fn compare_and_put(&self, expected_version: u64, issue: &Issue) -> StoreResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let key = schema::keys::issue(&issue.id);
        let current: Issue = self
            .get_json(schema::CF_ISSUES, &key)?
            .ok_or_else(|| StoreError::NotFound(issue.id.clone()))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                issue_id: issue.id.clone(),
                expected: expected_version,
                found: current.version,
            });
        }
        self.put_json(schema::CF_ISSUES, &key, issue)
    }

    fn list(&self) -> StoreResult<Vec<Issue>> {
        self.scan_prefix(schema::CF_ISSUES, "issue:")?
            .iter()
            .map(|bytes| {
                serde_json::from_slice(bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))
            })
            .collect()
    }
}

impl EscalationLedger for RocksStore {
    fn append(&self, record: &EscalationRecord) -> StoreResult<AppendOutcome> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let history = self.history(&record.issue_id)?;
        let existing = history.get((record.sequence as usize).wrapping_sub(1));
        let outcome = check_append(existing, history.len(), record)?;

        if outcome == AppendOutcome::Appended {
            let key = schema::keys::escalation(&record.issue_id, record.sequence);
            self.put_json(schema::CF_ESCALATIONS, &key, record)?;
        }
        Ok(outcome)
    }

    fn history(&self, issue_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        let prefix = schema::keys::escalation_prefix(issue_id);
        self.scan_prefix(schema::CF_ESCALATIONS, &prefix)?
            .iter()
            .map(|bytes| {
                serde_json::from_slice(bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))
            })
            .collect()
    }
}
