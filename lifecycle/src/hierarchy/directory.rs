//! Hierarchy directory: next-tier lookup and official pools

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use super::config::{HierarchyConfig, OfficialId};
use super::location::Location;
use super::tier::Tier;

/// Resolves which officials may handle issues at a tier for a location.
///
/// The location component owns the administrative data; the default
/// [`RosterResolver`] answers from the configured roster.
pub trait LocationResolver: Send + Sync {
    fn officials_for(&self, tier: Tier, location: &Location) -> Vec<OfficialId>;
}

/// Roster-backed resolver using jurisdiction depth per tier
pub struct RosterResolver {
    config: Arc<HierarchyConfig>,
}

impl RosterResolver {
    pub fn new(config: Arc<HierarchyConfig>) -> Self {
        Self { config }
    }
}

impl LocationResolver for RosterResolver {
    fn officials_for(&self, tier: Tier, location: &Location) -> Vec<OfficialId> {
        self.config
            .officials
            .iter()
            .filter(|o| o.approved && o.tier == tier && o.jurisdiction.covers(location, tier))
            .map(|o| o.id.clone())
            .collect()
    }
}

/// Shared reference to the directory
pub type SharedDirectory = Arc<HierarchyDirectory>;

/// Read-only view of the escalation ladder and official pools.
pub struct HierarchyDirectory {
    config: Arc<HierarchyConfig>,
    resolver: Arc<dyn LocationResolver>,
}

impl HierarchyDirectory {
    /// Directory backed by the config's own roster.
    pub fn new(config: HierarchyConfig) -> Self {
        let config = Arc::new(config);
        let resolver = Arc::new(RosterResolver::new(config.clone()));
        Self { config, resolver }
    }

    /// Directory with an external location resolver.
    pub fn with_resolver(config: HierarchyConfig, resolver: Arc<dyn LocationResolver>) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
        }
    }

    pub fn shared(self) -> SharedDirectory {
        Arc::new(self)
    }

    pub fn version(&self) -> u32 {
        self.config.version
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Lowest handling tier (where intake places new issues).
    pub fn entry_tier(&self) -> Tier {
        self.config
            .ladder
            .first()
            .copied()
            .unwrap_or(Tier::GramaNiladhari)
    }

    /// Whether `tier` is part of the configured ladder.
    pub fn is_ladder_tier(&self, tier: Tier) -> bool {
        self.config.ladder.contains(&tier)
    }

    /// The tier immediately above `tier`, or `None` at the top of the ladder.
    ///
    /// Tiers not on the configured ladder escalate to the lowest configured
    /// tier strictly above them.
    pub fn next_tier(&self, tier: Tier) -> Option<Tier> {
        self.config.ladder.iter().copied().find(|t| t.is_above(tier))
    }

    /// Officials eligible to handle an issue at `tier` in `location`.
    pub fn official_pool_for(&self, tier: Tier, location: &Location) -> Vec<OfficialId> {
        let pool = self.resolver.officials_for(tier, location);
        debug!(
            tier = %tier,
            gn_division = %location.gn_division,
            pool_size = pool.len(),
            "Resolved official pool"
        );
        pool
    }

    pub fn is_in_pool(&self, official: &str, tier: Tier, location: &Location) -> bool {
        self.official_pool_for(tier, location)
            .iter()
            .any(|id| id == official)
    }

    /// How long an issue may sit at `tier` before the sweep escalates it.
    pub fn response_window(&self, tier: Tier) -> Duration {
        Duration::days(i64::from(self.config.response_days_for(tier)))
    }
}
