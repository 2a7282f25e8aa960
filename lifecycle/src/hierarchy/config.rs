//! Versioned hierarchy configuration
//!
//! Loaded once at startup from TOML or YAML and handed to
//! [`HierarchyDirectory`](super::HierarchyDirectory). Reloading means building
//! a new directory out of band; the request path only ever reads.
//!
//! ```toml
//! version = 3
//! ladder = ["grama_niladhari", "divisional_secretary", "district_secretary",
//!           "provincial_ministry", "national_ministry", "prime_minister"]
//!
//! [response_days]
//! national_ministry = 7
//! prime_minister = 7
//!
//! [[officials]]
//! id = "gn-kollupitiya"
//! tier = "grama_niladhari"
//! province = "western"
//! district = "colombo"
//! ds_division = "thimbirigasyaya"
//! gn_division = "kollupitiya"
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::location::Jurisdiction;
use super::tier::Tier;

/// Identifier of a government official (user account id)
pub type OfficialId = String;

/// Default response window before an issue becomes overdue
pub const DEFAULT_RESPONSE_DAYS: u32 = 3;

/// Response window at national level and above
pub const SENIOR_RESPONSE_DAYS: u32 = 7;

/// Longest response window a roster may configure (ten years)
pub const MAX_RESPONSE_DAYS: u32 = 3650;

/// Errors raised while loading or validating hierarchy configuration
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("Failed to read hierarchy config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML hierarchy config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid YAML hierarchy config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid hierarchy config: {0}")]
    Invalid(String),
}

/// One official entry in the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficialEntry {
    pub id: OfficialId,
    pub tier: Tier,
    /// Area the official is responsible for
    #[serde(flatten)]
    pub jurisdiction: Jurisdiction,
    /// Registration approval; unapproved officials are never eligible
    #[serde(default = "default_approved")]
    pub approved: bool,
}

fn default_approved() -> bool {
    true
}

/// Complete hierarchy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Monotonic configuration version, recorded in logs
    #[serde(default)]
    pub version: u32,
    /// Escalation ladder from lowest to highest handling tier
    #[serde(default = "default_ladder")]
    pub ladder: Vec<Tier>,
    /// Response window overrides per tier (days)
    #[serde(default)]
    pub response_days: HashMap<Tier, u32>,
    /// Official roster
    #[serde(default)]
    pub officials: Vec<OfficialEntry>,
}

fn default_ladder() -> Vec<Tier> {
    Tier::LADDER.iter().copied().filter(|t| t.is_official()).collect()
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            version: 1,
            ladder: default_ladder(),
            response_days: HashMap::new(),
            officials: Vec::new(),
        }
    }
}

impl HierarchyConfig {
    /// Load from a `.toml`, `.yaml` or `.yml` file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HierarchyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| HierarchyError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, HierarchyError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, HierarchyError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Add an official to the roster (builder style, mostly for tests and seeding)
    pub fn with_official(
        mut self,
        id: impl Into<OfficialId>,
        tier: Tier,
        jurisdiction: Jurisdiction,
    ) -> Self {
        self.officials.push(OfficialEntry {
            id: id.into(),
            tier,
            jurisdiction,
            approved: true,
        });
        self
    }

    /// Check ladder ordering and roster consistency.
    pub fn validate(&self) -> Result<(), HierarchyError> {
        if self.ladder.is_empty() {
            return Err(HierarchyError::Invalid("ladder is empty".to_string()));
        }
        if let Some(bad) = self.ladder.iter().find(|t| !t.is_official()) {
            return Err(HierarchyError::Invalid(format!(
                "{} cannot be a ladder tier",
                bad
            )));
        }
        if !self.ladder.windows(2).all(|w| w[1].is_above(w[0])) {
            return Err(HierarchyError::Invalid(
                "ladder tiers must be strictly ascending".to_string(),
            ));
        }
        for (tier, days) in &self.response_days {
            if *days == 0 || *days > MAX_RESPONSE_DAYS {
                return Err(HierarchyError::Invalid(format!(
                    "response window for {} must be between 1 and {} days, got {}",
                    tier, MAX_RESPONSE_DAYS, days
                )));
            }
        }

        let mut seen = HashSet::new();
        for official in &self.officials {
            if !seen.insert(official.id.as_str()) {
                return Err(HierarchyError::Invalid(format!(
                    "duplicate official id {}",
                    official.id
                )));
            }
            if !self.ladder.contains(&official.tier) {
                return Err(HierarchyError::Invalid(format!(
                    "official {} has tier {} which is not on the ladder",
                    official.id, official.tier
                )));
            }
        }
        Ok(())
    }

    /// Response window for issues handled at `tier`.
    pub fn response_days_for(&self, tier: Tier) -> u32 {
        if let Some(days) = self.response_days.get(&tier) {
            return *days;
        }
        match tier {
            Tier::NationalMinistry | Tier::PrimeMinister => SENIOR_RESPONSE_DAYS,
            _ => DEFAULT_RESPONSE_DAYS,
        }
    }
}
