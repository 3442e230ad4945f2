//! Typed views over the `GeoJSON` features the map renders.
//!
//! Earthquakes come straight from the USGS feed and are never mutated.
//! Risk cells come from the inference service, which may also merge
//! earthquake points into the same collection. Merged collections are told
//! apart by the `properties.type` discriminator and decoded into
//! [`MapFeature`].

use geojson::Geometry;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{MagnitudeTier, RiskLevel};

/// Discriminator value for earthquake features.
pub const EARTHQUAKE_TYPE: &str = "earthquake";

/// Discriminator value for risk cell features.
pub const RISK_CELL_TYPE: &str = "risk_cell";

/// Event time as either epoch milliseconds (USGS) or an ISO 8601 string
/// (inference service output).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
    /// ISO 8601 timestamp.
    Iso(String),
}

impl std::fmt::Display for EventTime {
    /// Epoch milliseconds render as `YYYY-MM-DD HH:MM UTC`; ISO strings
    /// are shown as given.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EpochMillis(ms) => match chrono::DateTime::from_timestamp_millis(*ms) {
                Some(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M UTC")),
                None => write!(f, "{ms}"),
            },
            Self::Iso(s) => f.write_str(s),
        }
    }
}

/// Properties of an earthquake point.
///
/// Only the fields the map uses are decoded; the rest of the upstream
/// properties are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeProperties {
    /// Magnitude. USGS occasionally reports `null`.
    #[serde(default)]
    pub mag: Option<f64>,
    /// Human-readable location description.
    #[serde(default)]
    pub place: Option<String>,
    /// Origin time.
    #[serde(default)]
    pub time: Option<EventTime>,
    /// Depth in kilometres, when carried in properties rather than the
    /// third coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
}

/// An earthquake point feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeFeature {
    /// Upstream event ID.
    #[serde(
        default,
        deserialize_with = "deserialize_feature_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Point geometry, `[lon, lat]` or `[lon, lat, depth]`.
    pub geometry: Geometry,
    /// Event properties.
    pub properties: EarthquakeProperties,
}

impl EarthquakeFeature {
    /// Decodes a raw feed feature.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the feature has no usable
    /// geometry or properties.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Returns `(longitude, latitude, depth_km)` for point geometries.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64, Option<f64>)> {
        match &self.geometry.value {
            geojson::Value::Point(coords) if coords.len() >= 2 => Some((
                coords[0],
                coords[1],
                coords.get(2).copied().or(self.properties.depth),
            )),
            _ => None,
        }
    }

    /// Colour bucket for this event's magnitude.
    #[must_use]
    pub fn tier(&self) -> MagnitudeTier {
        MagnitudeTier::from_magnitude(self.properties.mag)
    }
}

/// The strongest event recorded in a risk cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotableEvent {
    /// Magnitude.
    pub mag: f64,
    /// Location description.
    #[serde(default)]
    pub place: String,
    /// ISO 8601 origin time.
    #[serde(default)]
    pub time: String,
    /// Depth in kilometres.
    #[serde(default)]
    pub depth: Option<f64>,
}

/// Properties of a risk cell polygon, as produced by the inference service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCellProperties {
    /// Grid cell key, e.g. `"34.0,-118.0"`.
    pub cell: String,
    /// Named area the cell falls in.
    #[serde(default)]
    pub region: String,
    /// Model probability in `[0, 1]`.
    pub risk_prob: f64,
    /// Level reported by the model. Rendering recomputes it from
    /// [`Self::risk_prob`].
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    /// Events counted in the cell.
    #[serde(default)]
    pub quake_count: u32,
    /// Mean magnitude.
    #[serde(default)]
    pub mean_mag: Option<f64>,
    /// Maximum magnitude.
    #[serde(default)]
    pub max_mag: Option<f64>,
    /// Mean depth in kilometres.
    #[serde(default)]
    pub mean_depth_km: Option<f64>,
    /// Gutenberg-Richter b-value.
    #[serde(default)]
    pub b_value: Option<f64>,
    /// Strongest event in the cell, if any.
    #[serde(default)]
    pub notable_event: Option<NotableEvent>,
}

/// A risk cell polygon feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCellFeature {
    /// Polygon geometry.
    pub geometry: Geometry,
    /// Cell statistics.
    pub properties: RiskCellProperties,
}

impl RiskCellFeature {
    /// Colour bucket for this cell's probability.
    #[must_use]
    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_probability(self.properties.risk_prob)
    }
}

/// A feature from a merged collection, decoded by its discriminator.
#[derive(Debug, Clone, PartialEq)]
pub enum MapFeature {
    /// `properties.type == "earthquake"`.
    Earthquake(EarthquakeFeature),
    /// `properties.type == "risk_cell"`.
    RiskCell(RiskCellFeature),
}

impl MapFeature {
    /// Decodes one feature of a merged collection.
    ///
    /// Returns `None` for features whose discriminator is missing or
    /// unknown, or whose body does not match the discriminated shape.
    #[must_use]
    pub fn decode(value: &serde_json::Value) -> Option<Self> {
        match TaggedFeature::deserialize(value) {
            Ok(tagged) => Some(match tagged.properties {
                TaggedProperties::Earthquake(properties) => Self::Earthquake(EarthquakeFeature {
                    id: tagged.id,
                    geometry: tagged.geometry,
                    properties,
                }),
                TaggedProperties::RiskCell(properties) => Self::RiskCell(RiskCellFeature {
                    geometry: tagged.geometry,
                    properties,
                }),
            }),
            Err(e) => {
                log::debug!("Skipping undecodable map feature: {e}");
                None
            }
        }
    }

    /// The discriminator this feature was decoded from.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Earthquake(_) => EARTHQUAKE_TYPE,
            Self::RiskCell(_) => RISK_CELL_TYPE,
        }
    }

    /// The feature's geometry.
    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        match self {
            Self::Earthquake(f) => &f.geometry,
            Self::RiskCell(f) => &f.geometry,
        }
    }
}

#[derive(Deserialize)]
struct TaggedFeature {
    #[serde(default, deserialize_with = "deserialize_feature_id")]
    id: Option<String>,
    geometry: Geometry,
    properties: TaggedProperties,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedProperties {
    Earthquake(EarthquakeProperties),
    RiskCell(RiskCellProperties),
}

/// Accepts string or numeric feature IDs.
fn deserialize_feature_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usgs_feature() -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "id": "ci40123456",
            "geometry": { "type": "Point", "coordinates": [-117.6, 35.7, 8.2] },
            "properties": {
                "mag": 4.4,
                "place": "12 km SW of Searles Valley, CA",
                "time": 1_700_000_000_000_i64,
                "type": "earthquake",
                "status": "reviewed"
            }
        })
    }

    fn risk_cell() -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-118.0, 34.0], [-116.0, 34.0], [-116.0, 36.0], [-118.0, 36.0], [-118.0, 34.0]]]
            },
            "properties": {
                "type": "risk_cell",
                "cell": "34.0,-118.0",
                "region": "Southern California",
                "risk_prob": 0.71,
                "risk_level": "high",
                "quake_count": 14,
                "mean_mag": 3.42,
                "max_mag": 4.9,
                "mean_depth_km": 9.1,
                "b_value": 0.873,
                "notable_event": {
                    "mag": 4.9,
                    "place": "5 km N of Ridgecrest, CA",
                    "time": "2025-01-03T04:05:06",
                    "depth": 7.5
                }
            }
        })
    }

    #[test]
    fn decodes_usgs_feature_without_discriminator() {
        let feature = EarthquakeFeature::from_value(&usgs_feature()).unwrap();
        assert_eq!(feature.id.as_deref(), Some("ci40123456"));
        assert_eq!(feature.position(), Some((-117.6, 35.7, Some(8.2))));
        assert_eq!(
            feature.properties.time,
            Some(EventTime::EpochMillis(1_700_000_000_000))
        );
        assert_eq!(feature.tier(), MagnitudeTier::Strong);
        assert_eq!(
            feature.properties.time.unwrap().to_string(),
            "2023-11-14 22:13 UTC"
        );
    }

    #[test]
    fn decodes_merged_collection_by_discriminator() {
        let quake = MapFeature::decode(&usgs_feature()).unwrap();
        assert_eq!(quake.kind(), EARTHQUAKE_TYPE);

        let MapFeature::RiskCell(cell) = MapFeature::decode(&risk_cell()).unwrap() else {
            panic!("expected a risk cell");
        };
        assert_eq!(cell.level(), RiskLevel::High);
        assert_eq!(cell.properties.quake_count, 14);
        assert_eq!(
            cell.properties.notable_event.as_ref().map(|e| e.place.as_str()),
            Some("5 km N of Ridgecrest, CA")
        );
    }

    #[test]
    fn inference_earthquake_uses_depth_property() {
        let value = serde_json::json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [-121.0, 37.0] },
            "properties": { "type": "earthquake", "mag": 3.1, "depth": 11.0, "place": "", "time": "2025-02-01T00:00:00" }
        });
        let Some(MapFeature::Earthquake(quake)) = MapFeature::decode(&value) else {
            panic!("expected an earthquake");
        };
        assert_eq!(quake.position(), Some((-121.0, 37.0, Some(11.0))));
        assert_eq!(
            quake.properties.time,
            Some(EventTime::Iso("2025-02-01T00:00:00".to_string()))
        );
    }

    #[test]
    fn unknown_discriminator_is_skipped() {
        let mut value = usgs_feature();
        value["properties"]["type"] = serde_json::json!("quarry blast");
        assert!(MapFeature::decode(&value).is_none());

        let mut value = risk_cell();
        value["properties"]
            .as_object_mut()
            .unwrap()
            .remove("type");
        assert!(MapFeature::decode(&value).is_none());
    }
}
