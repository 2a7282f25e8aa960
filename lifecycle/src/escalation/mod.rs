//! Issue transitions and escalation
//!
//! - [`TransitionAuthority`]: pure rule evaluation over an issue snapshot
//! - [`EscalationEngine`]: lock, validate, write, audit, publish
//! - [`sweep`]: automatic escalation of overdue issues
//!
//! # Usage
//!
//! ```ignore
//! use issue_lifecycle::escalation::{Actor, EscalationEngine};
//!
//! let engine = EscalationEngine::new(store, ledger, directory, EngineConfig::from_env());
//! let issue = engine
//!     .request_escalation(&issue_id, "needs funding", Actor::official("gn-1", Tier::GramaNiladhari))
//!     .await?;
//! assert_eq!(issue.escalation_count, engine.get_escalation_history(&issue_id)?.len() as u32);
//! ```

pub mod authority;
pub mod engine;
pub mod locks;
pub mod request;
pub mod sweep;

pub use authority::{is_allowed_edge, Decision, Transition, TransitionAuthority};
pub use engine::{EscalationEngine, SharedEngine, AUTO_ESCALATION_REASON};
pub use locks::{IssueGuard, IssueLocks, LockTimeout};
pub use request::{Actor, RequestedChange, TransitionRequest, SYSTEM_ACTOR_ID};
pub use sweep::{run_sweeper, SweepAction, SweepEntry, SweepReport};
