#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Earthquake query parameters, named regions and display tiers.
//!
//! This crate holds the types shared by every other quake map package:
//! the whitelisted [`Region`]s, the validated [`QueryParameters`] for a
//! `getEarthquakes` tool call, and the colour buckets used when rendering
//! earthquake markers ([`MagnitudeTier`]) and risk cells ([`RiskLevel`]).
//!
//! Tool arguments arrive from an LLM and can be out of range or made up.
//! [`QueryParameters::from_raw`] never rejects them: magnitudes and day
//! counts are clamped, and an unknown region is dropped so the query runs
//! unfiltered.

pub mod features;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Lowest accepted minimum magnitude.
pub const MIN_MAGNITUDE_FLOOR: f64 = 0.0;

/// Highest accepted minimum magnitude.
pub const MIN_MAGNITUDE_CEILING: f64 = 10.0;

/// Fewest days a query may look back.
pub const MIN_DAYS: u32 = 1;

/// Most days a query may look back.
pub const MAX_DAYS: u32 = 90;

/// Minimum magnitude used when the model omits the argument.
pub const DEFAULT_MIN_MAGNITUDE: f64 = 2.5;

/// Look-back window used when the model omits the argument.
pub const DEFAULT_DAYS: u32 = 7;

/// Region assumed for the risk overlay before any query has named one.
pub const DEFAULT_RISK_REGION: Region = Region::California;

/// A whitelisted geographic filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Region {
    /// The state of California and its offshore margin.
    California,
}

impl Region {
    /// Returns every whitelisted region.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::California]
    }

    /// The bounding box sent to the earthquake feed for this region.
    #[must_use]
    pub const fn bounding_box(self) -> BoundingBox {
        match self {
            Self::California => BoundingBox {
                min_latitude: 32.0,
                max_latitude: 42.0,
                min_longitude: -125.0,
                max_longitude: -114.0,
            },
        }
    }

    /// Parses a region token, accepting only whitelisted names.
    ///
    /// Surrounding whitespace is ignored and matching is ASCII
    /// case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRegionError`] if the token names no whitelisted
    /// region.
    pub fn parse_whitelisted(token: &str) -> Result<Self, InvalidRegionError> {
        token.trim().parse().map_err(|_| InvalidRegionError {
            region: token.to_string(),
        })
    }
}

/// Error returned when a region token is not on the whitelist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid region '{region}': expected one of: california")]
pub struct InvalidRegionError {
    /// The rejected token, as received.
    pub region: String,
}

/// A latitude/longitude box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern edge.
    pub min_latitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
    /// Western edge.
    pub min_longitude: f64,
    /// Eastern edge.
    pub max_longitude: f64,
}

/// Tool arguments exactly as the model supplied them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQueryArgs {
    /// Requested minimum magnitude.
    #[serde(default)]
    pub min_magnitude: Option<f64>,
    /// Requested look-back window in days. Fractional values are rounded.
    #[serde(default)]
    pub days: Option<f64>,
    /// Requested region token.
    #[serde(default)]
    pub region: Option<String>,
}

/// Validated parameters for one `getEarthquakes` invocation.
///
/// Always satisfies `min_magnitude ∈ [0, 10]`, `days ∈ [1, 90]`, and
/// `region` is either absent or whitelisted. Deserializing goes through
/// [`QueryParameters::from_raw`], so the invariants also hold for values
/// read back from a client-supplied transcript.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawQueryArgs")]
pub struct QueryParameters {
    /// Minimum magnitude, inclusive.
    pub min_magnitude: f64,
    /// Whole days to look back from today.
    pub days: u32,
    /// Optional region filter.
    pub region: Option<Region>,
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self {
            min_magnitude: DEFAULT_MIN_MAGNITUDE,
            days: DEFAULT_DAYS,
            region: None,
        }
    }
}

impl QueryParameters {
    /// Validates raw tool arguments.
    ///
    /// Out-of-range numbers are clamped, missing or non-finite numbers take
    /// their defaults, and an unrecognised region is dropped with a warning
    /// so that the query degrades to a global one.
    #[must_use]
    pub fn from_raw(raw: RawQueryArgs) -> Self {
        let min_magnitude = raw
            .min_magnitude
            .filter(|m| m.is_finite())
            .map_or(DEFAULT_MIN_MAGNITUDE, clamp_magnitude);

        let days = raw
            .days
            .filter(|d| d.is_finite())
            .map_or(DEFAULT_DAYS, clamp_days);

        let region = raw
            .region
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .and_then(|r| match Region::parse_whitelisted(r) {
                Ok(region) => Some(region),
                Err(e) => {
                    log::warn!("{e}; querying without a region filter");
                    None
                }
            });

        Self {
            min_magnitude,
            days,
            region,
        }
    }
}

impl From<RawQueryArgs> for QueryParameters {
    fn from(raw: RawQueryArgs) -> Self {
        Self::from_raw(raw)
    }
}

/// Clamps a minimum magnitude into `[0, 10]`.
#[must_use]
pub fn clamp_magnitude(magnitude: f64) -> f64 {
    magnitude.clamp(MIN_MAGNITUDE_FLOOR, MIN_MAGNITUDE_CEILING)
}

/// Rounds a day count to the nearest whole day, then clamps into `[1, 90]`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_days(days: f64) -> u32 {
    days.round()
        .clamp(f64::from(MIN_DAYS), f64::from(MAX_DAYS)) as u32
}

/// Colour bucket for an earthquake marker.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MagnitudeTier {
    /// Magnitude 6 and above.
    Major,
    /// Magnitude 4 up to 6.
    Strong,
    /// Magnitude 2 up to 4.
    Light,
    /// Below magnitude 2, or unknown.
    Minor,
}

impl MagnitudeTier {
    /// Buckets a magnitude. Lower bounds are inclusive.
    #[must_use]
    pub fn from_magnitude(magnitude: Option<f64>) -> Self {
        match magnitude {
            Some(m) if m >= 6.0 => Self::Major,
            Some(m) if m >= 4.0 => Self::Strong,
            Some(m) if m >= 2.0 => Self::Light,
            _ => Self::Minor,
        }
    }

    /// Marker fill colour.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Major => "#dc2626",
            Self::Strong => "#f97316",
            Self::Light => "#facc15",
            Self::Minor => "#9ca3af",
        }
    }

    /// Returns all tiers from strongest to weakest.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Major, Self::Strong, Self::Light, Self::Minor]
    }
}

/// Risk bucket for a risk cell.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    /// Probability above 0.7.
    High,
    /// Probability above 0.4, up to 0.7.
    Moderate,
    /// Probability of 0.4 or less.
    Low,
}

impl RiskLevel {
    /// Buckets a risk probability. Both thresholds are strict.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.7 {
            Self::High
        } else if probability > 0.4 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    /// Polygon fill colour.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::High => "#dc2626",
            Self::Moderate => "#f97316",
            Self::Low => "#22c55e",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(min_magnitude: f64, days: f64, region: Option<&str>) -> RawQueryArgs {
        RawQueryArgs {
            min_magnitude: Some(min_magnitude),
            days: Some(days),
            region: region.map(str::to_string),
        }
    }

    #[test]
    fn magnitude_is_clamped_not_rejected() {
        assert!((clamp_magnitude(-3.0) - 0.0).abs() < f64::EPSILON);
        assert!((clamp_magnitude(14.0) - 10.0).abs() < f64::EPSILON);
        assert!((clamp_magnitude(4.5) - 4.5).abs() < f64::EPSILON);

        let params = QueryParameters::from_raw(raw(-3.0, 7.0, None));
        assert!(params.min_magnitude.abs() < f64::EPSILON);
    }

    #[test]
    fn days_are_rounded_then_clamped() {
        assert_eq!(clamp_days(0.4), 1);
        assert_eq!(clamp_days(500.0), 90);
        assert_eq!(clamp_days(6.5), 7);
        assert_eq!(clamp_days(-20.0), 1);
        assert_eq!(clamp_days(30.0), 30);
    }

    #[test]
    fn unknown_region_degrades_to_global_query() {
        let params = QueryParameters::from_raw(raw(3.0, 7.0, Some("texas")));
        assert_eq!(params.region, None);
        assert_eq!(params.days, 7);
    }

    #[test]
    fn region_parsing_is_trimmed_and_case_insensitive() {
        assert_eq!(
            Region::parse_whitelisted("  California "),
            Ok(Region::California)
        );
        let err = Region::parse_whitelisted("west_coast").unwrap_err();
        assert_eq!(err.region, "west_coast");
    }

    #[test]
    fn missing_and_non_finite_values_take_defaults() {
        let params = QueryParameters::from_raw(RawQueryArgs {
            min_magnitude: Some(f64::NAN),
            days: None,
            region: Some(String::new()),
        });
        assert_eq!(params, QueryParameters::default());
    }

    #[test]
    fn deserializing_revalidates() {
        let params: QueryParameters = serde_json::from_value(serde_json::json!({
            "minMagnitude": 42,
            "days": 0.2,
            "region": "CALIFORNIA"
        }))
        .unwrap();
        assert!((params.min_magnitude - 10.0).abs() < f64::EPSILON);
        assert_eq!(params.days, 1);
        assert_eq!(params.region, Some(Region::California));

        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["region"], "california");
        assert_eq!(json["days"], 1);
    }

    #[test]
    fn california_bounding_box() {
        let bbox = Region::California.bounding_box();
        assert!((bbox.min_latitude - 32.0).abs() < f64::EPSILON);
        assert!((bbox.max_latitude - 42.0).abs() < f64::EPSILON);
        assert!((bbox.min_longitude + 125.0).abs() < f64::EPSILON);
        assert!((bbox.max_longitude + 114.0).abs() < f64::EPSILON);
    }

    #[test]
    fn magnitude_tiers_use_inclusive_lower_bounds() {
        assert_eq!(MagnitudeTier::from_magnitude(Some(6.0)), MagnitudeTier::Major);
        assert_eq!(MagnitudeTier::from_magnitude(Some(5.99)), MagnitudeTier::Strong);
        assert_eq!(MagnitudeTier::from_magnitude(Some(4.0)), MagnitudeTier::Strong);
        assert_eq!(MagnitudeTier::from_magnitude(Some(2.0)), MagnitudeTier::Light);
        assert_eq!(MagnitudeTier::from_magnitude(Some(1.9)), MagnitudeTier::Minor);
        assert_eq!(MagnitudeTier::from_magnitude(None), MagnitudeTier::Minor);
    }

    #[test]
    fn risk_levels_use_strict_thresholds() {
        assert_eq!(RiskLevel::from_probability(0.71), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.70), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.41), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.40), RiskLevel::Low);
        assert_eq!(RiskLevel::High.color(), "#dc2626");
    }
}
