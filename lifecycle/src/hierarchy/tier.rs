//! Administrative tiers and the escalation ladder ordering

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One rung of the government hierarchy, or the orthogonal `Admin` tier.
///
/// Ladder tiers are ordered by [`Tier::ladder_rank`]. `Admin` has no rank:
/// it can act at any level but an issue is never handled "at" admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Members of the public who submit grievances
    Citizen,
    /// Village-level officer for a GN division
    GramaNiladhari,
    /// Divisional Secretariat officer
    DivisionalSecretary,
    /// District Secretariat officer
    DistrictSecretary,
    /// Provincial ministry
    ProvincialMinistry,
    /// National ministry
    NationalMinistry,
    /// Prime Minister's office (top of the ladder)
    PrimeMinister,
    /// Cross-cutting administrator
    Admin,
}

impl Tier {
    /// The full ladder from lowest to highest rung.
    pub const LADDER: [Tier; 7] = [
        Tier::Citizen,
        Tier::GramaNiladhari,
        Tier::DivisionalSecretary,
        Tier::DistrictSecretary,
        Tier::ProvincialMinistry,
        Tier::NationalMinistry,
        Tier::PrimeMinister,
    ];

    /// Position on the ladder, `None` for `Admin`.
    pub fn ladder_rank(self) -> Option<u8> {
        match self {
            Self::Citizen => Some(0),
            Self::GramaNiladhari => Some(1),
            Self::DivisionalSecretary => Some(2),
            Self::DistrictSecretary => Some(3),
            Self::ProvincialMinistry => Some(4),
            Self::NationalMinistry => Some(5),
            Self::PrimeMinister => Some(6),
            Self::Admin => None,
        }
    }

    /// Whether an issue can be handled at this tier (ladder rung above citizen).
    pub fn is_official(self) -> bool {
        matches!(self.ladder_rank(), Some(rank) if rank > 0)
    }

    /// `self >= other` on the ladder. Always false if either side is `Admin`.
    pub fn is_at_least(self, other: Tier) -> bool {
        match (self.ladder_rank(), other.ladder_rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// `self > other` on the ladder. Always false if either side is `Admin`.
    pub fn is_above(self, other: Tier) -> bool {
        match (self.ladder_rank(), other.ladder_rank()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// How many location fields an official's jurisdiction must match at this tier.
    ///
    /// GN officers are bound to a GN division (all four fields), divisional
    /// secretaries to a DS division, district secretaries to a district,
    /// provincial ministries to a province. National bodies are nationwide.
    pub fn jurisdiction_depth(self) -> usize {
        match self {
            Self::GramaNiladhari => 4,
            Self::DivisionalSecretary => 3,
            Self::DistrictSecretary => 2,
            Self::ProvincialMinistry => 1,
            Self::NationalMinistry | Self::PrimeMinister | Self::Admin | Self::Citizen => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::GramaNiladhari => "grama_niladhari",
            Self::DivisionalSecretary => "divisional_secretary",
            Self::DistrictSecretary => "district_secretary",
            Self::ProvincialMinistry => "provincial_ministry",
            Self::NationalMinistry => "national_ministry",
            Self::PrimeMinister => "prime_minister",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown tier name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "citizen" => Ok(Self::Citizen),
            "grama_niladhari" | "gn" => Ok(Self::GramaNiladhari),
            "divisional_secretary" | "ds" => Ok(Self::DivisionalSecretary),
            "district_secretary" => Ok(Self::DistrictSecretary),
            "provincial_ministry" => Ok(Self::ProvincialMinistry),
            "national_ministry" => Ok(Self::NationalMinistry),
            "prime_minister" | "pm" => Ok(Self::PrimeMinister),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownTier(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_is_strictly_ascending() {
        let ranks: Vec<u8> = Tier::LADDER.iter().filter_map(|t| t.ladder_rank()).collect();
        assert_eq!(ranks.len(), Tier::LADDER.len());
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_admin_is_off_ladder() {
        assert_eq!(Tier::Admin.ladder_rank(), None);
        assert!(!Tier::Admin.is_at_least(Tier::Citizen));
        assert!(!Tier::PrimeMinister.is_at_least(Tier::Admin));
        assert!(!Tier::Admin.is_official());
    }

    #[test]
    fn test_comparisons() {
        assert!(Tier::DistrictSecretary.is_at_least(Tier::DistrictSecretary));
        assert!(Tier::NationalMinistry.is_at_least(Tier::DistrictSecretary));
        assert!(!Tier::GramaNiladhari.is_at_least(Tier::DistrictSecretary));
        assert!(Tier::DivisionalSecretary.is_above(Tier::GramaNiladhari));
        assert!(!Tier::GramaNiladhari.is_above(Tier::GramaNiladhari));
        assert!(!Tier::Citizen.is_official());
    }

    #[test]
    fn test_parse_and_display() {
        for tier in Tier::LADDER.iter().copied().chain([Tier::Admin]) {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
        assert_eq!("GN".parse::<Tier>().unwrap(), Tier::GramaNiladhari);
        assert_eq!(
            "district-secretary".parse::<Tier>().unwrap(),
            Tier::DistrictSecretary
        );
        assert!("mayor".parse::<Tier>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Tier::ProvincialMinistry).unwrap();
        assert_eq!(json, "\"provincial_ministry\"");
    }
}
