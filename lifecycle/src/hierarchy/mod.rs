//! Hierarchy directory: the escalation ladder and who may act on it
//!
//! ```text
//! grama_niladhari
//!     │  GN division officer
//!     ▼
//! divisional_secretary
//!     ▼
//! district_secretary      ← may close issues from here up
//!     ▼
//! provincial_ministry
//!     ▼
//! national_ministry
//!     ▼
//! prime_minister          ← top: escalation rejected
//!
//! admin                   (off-ladder, override authority at any level)
//! ```
//!
//! Pure lookups against an injected, versioned [`HierarchyConfig`].

pub mod config;
pub mod directory;
pub mod location;
pub mod tier;

pub use config::{HierarchyConfig, HierarchyError, OfficialEntry, OfficialId, MAX_RESPONSE_DAYS};
pub use directory::{HierarchyDirectory, LocationResolver, RosterResolver, SharedDirectory};
pub use location::{Jurisdiction, Location};
pub use tier::{Tier, UnknownTier};
