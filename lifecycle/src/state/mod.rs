//! Issue state persistence
//!
//! Two logical tables:
//!
//! - `issues`: current state per issue, written with compare-and-swap on a
//!   version column
//! - `escalations`: append-only ledger keyed by `(issue_id, sequence)`
//!
//! Backends: in-memory (default), JSON files, and RocksDB behind the
//! `heavy-state` feature.
//!
//! # Usage
//!
//! ```ignore
//! use issue_lifecycle::state::{FileStore, IssueStore, EscalationLedger};
//!
//! let store = FileStore::open("./lifecycle-state")?;
//! store.insert(&issue)?;
//! let history = store.history(&issue.id)?;
//! ```

pub mod file;
#[cfg(feature = "heavy-state")]
pub mod rocks;
pub mod schema;
pub mod store;
pub mod types;

pub use file::FileStore;
#[cfg(feature = "heavy-state")]
pub use rocks::RocksStore;
pub use store::{
    AppendOutcome, EscalationLedger, IssueStore, MemoryIssueStore, MemoryLedger, SharedIssueStore,
    SharedLedger, StoreError, StoreResult,
};
pub use types::{
    generate_reference_number, Category, EscalationRecord, Issue, IssueId, IssueSnapshot,
    IssueStatus, Priority,
};
