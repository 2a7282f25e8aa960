//! Administrative locations and jurisdiction matching
//!
//! Location data (province → district → DS division → GN division) is owned
//! by the location component; this crate only compares identifiers.

use serde::{Deserialize, Serialize};

use super::tier::Tier;

/// Where an issue was reported, resolved down to its GN division.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub province: String,
    pub district: String,
    pub ds_division: String,
    pub gn_division: String,
}

impl Location {
    pub fn new(
        province: impl Into<String>,
        district: impl Into<String>,
        ds_division: impl Into<String>,
        gn_division: impl Into<String>,
    ) -> Self {
        Self {
            province: province.into(),
            district: district.into(),
            ds_division: ds_division.into(),
            gn_division: gn_division.into(),
        }
    }

    fn field(&self, depth: usize) -> &str {
        match depth {
            0 => &self.province,
            1 => &self.district,
            2 => &self.ds_division,
            _ => &self.gn_division,
        }
    }
}

/// A partially specified location: an official's area, or a dashboard filter.
///
/// Unset fields are wildcards only below the depth being checked; see
/// [`Jurisdiction::covers`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_division: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gn_division: Option<String>,
}

impl Jurisdiction {
    /// Nationwide scope.
    pub fn national() -> Self {
        Self::default()
    }

    /// The exact scope of a location (all four fields set).
    pub fn of(location: &Location) -> Self {
        Self {
            province: Some(location.province.clone()),
            district: Some(location.district.clone()),
            ds_division: Some(location.ds_division.clone()),
            gn_division: Some(location.gn_division.clone()),
        }
    }

    pub fn province(mut self, province: impl Into<String>) -> Self {
        self.province = Some(province.into());
        self
    }

    pub fn district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }

    pub fn ds_division(mut self, ds_division: impl Into<String>) -> Self {
        self.ds_division = Some(ds_division.into());
        self
    }

    pub fn gn_division(mut self, gn_division: impl Into<String>) -> Self {
        self.gn_division = Some(gn_division.into());
        self
    }

    fn field(&self, depth: usize) -> Option<&str> {
        match depth {
            0 => self.province.as_deref(),
            1 => self.district.as_deref(),
            2 => self.ds_division.as_deref(),
            _ => self.gn_division.as_deref(),
        }
    }

    /// Whether this scope covers `location` for a given tier.
    ///
    /// The first `tier.jurisdiction_depth()` fields must all be set and equal
    /// to the location's. A missing field at a required depth never matches.
    pub fn covers(&self, location: &Location, tier: Tier) -> bool {
        (0..tier.jurisdiction_depth()).all(|depth| self.field(depth) == Some(location.field(depth)))
    }

    /// Whether every field that is set equals the location's. Unset fields
    /// match anything, so [`Jurisdiction::national`] matches every location.
    pub fn contains(&self, location: &Location) -> bool {
        (0..4).all(|depth| {
            self.field(depth)
                .map_or(true, |value| value == location.field(depth))
        })
    }
}
