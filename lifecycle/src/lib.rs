//! Issue Lifecycle & Escalation Engine
//!
//! Owns a grievance's status, handling tier and escalation history, and the
//! rules for who may move it and where.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      EscalationEngine                        │
//! │   lock ─▶ TransitionAuthority ─▶ IssueStore ─▶ Ledger ─▶ Bus │
//! └───────────────┬──────────────────────────────────────────────┘
//!                 │
//!                 ▼
//!        HierarchyDirectory (ladder + official pools, read-only)
//! ```
//!
//! # Modules
//!
//! - [`hierarchy`]: tiers, locations, versioned hierarchy configuration
//! - [`state`]: issue rows and the append-only escalation ledger
//! - [`escalation`]: transition rules, the engine, and the deadline sweep
//! - [`events`]: lifecycle notifications
//! - [`projection`]: dashboard read models
//!
//! # Features
//!
//! - `heavy-state`: RocksDB storage backend

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod error;
pub mod escalation;
pub mod events;
pub mod hierarchy;
pub mod projection;
pub mod state;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorKind, Rejection, StructuredError};
pub use escalation::{
    run_sweeper, Actor, Decision, EscalationEngine, RequestedChange, SharedEngine, SweepAction,
    SweepReport, Transition, TransitionAuthority, TransitionRequest,
};
pub use events::{EventBus, EventFilter, LifecycleEvent, SharedEventBus};
pub use hierarchy::{
    HierarchyConfig, HierarchyDirectory, Jurisdiction, Location, SharedDirectory, Tier,
};
pub use projection::{DashboardStats, EscalatedIssue};
pub use state::{
    EscalationLedger, EscalationRecord, Issue, IssueSnapshot, IssueStatus, IssueStore,
};
