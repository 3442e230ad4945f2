#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map layer fusion.
//!
//! Combines the earthquake set from the latest `getEarthquakes` call with
//! the risk overlay into two independently renderable layers: colour-tiered
//! markers and colour-levelled polygons. The risk payload may itself carry
//! earthquake points; those join the marker layer. Display bounds cover
//! every marker and every polygon vertex.

use geo::{BoundingRect, CoordsIter, MultiPoint, Point};
use quake_map_quake_models::features::{
    EarthquakeFeature, EventTime, MapFeature, NotableEvent, RiskCellFeature,
};
use quake_map_quake_models::{BoundingBox, MagnitudeTier, RiskLevel};
use serde::Serialize;

/// A point marker for one earthquake.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarthquakeMarker {
    /// Upstream event ID.
    pub id: Option<String>,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Depth in kilometres.
    pub depth_km: Option<f64>,
    /// Magnitude.
    pub magnitude: Option<f64>,
    /// Location description.
    pub place: Option<String>,
    /// Origin time.
    pub time: Option<EventTime>,
    /// Colour bucket.
    pub tier: MagnitudeTier,
    /// Fill colour for [`Self::tier`].
    pub color: &'static str,
}

impl EarthquakeMarker {
    /// Builds a marker. Returns `None` for non-point geometries.
    #[must_use]
    pub fn from_feature(feature: EarthquakeFeature) -> Option<Self> {
        let (longitude, latitude, depth_km) = feature.position()?;
        let tier = feature.tier();

        Some(Self {
            id: feature.id,
            longitude,
            latitude,
            depth_km,
            magnitude: feature.properties.mag,
            place: feature.properties.place,
            time: feature.properties.time,
            tier,
            color: tier.color(),
        })
    }
}

/// A risk cell polygon with its colour level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCellPolygon {
    /// Cell polygon.
    pub geometry: geojson::Geometry,
    /// Grid cell key.
    pub cell: String,
    /// Named area.
    pub region: String,
    /// Model probability.
    pub risk_prob: f64,
    /// Level recomputed from [`Self::risk_prob`].
    pub level: RiskLevel,
    /// Fill colour for [`Self::level`].
    pub color: &'static str,
    /// Events counted in the cell.
    pub quake_count: u32,
    /// Mean magnitude.
    pub mean_mag: Option<f64>,
    /// Maximum magnitude.
    pub max_mag: Option<f64>,
    /// Mean depth in kilometres.
    pub mean_depth_km: Option<f64>,
    /// Gutenberg-Richter b-value.
    pub b_value: Option<f64>,
    /// Strongest event in the cell.
    pub notable_event: Option<NotableEvent>,
}

impl From<RiskCellFeature> for RiskCellPolygon {
    fn from(feature: RiskCellFeature) -> Self {
        let level = feature.level();
        let p = feature.properties;

        Self {
            geometry: feature.geometry,
            cell: p.cell,
            region: p.region,
            risk_prob: p.risk_prob,
            level,
            color: level.color(),
            quake_count: p.quake_count,
            mean_mag: p.mean_mag,
            max_mag: p.max_mag,
            mean_depth_km: p.mean_depth_km,
            b_value: p.b_value,
            notable_event: p.notable_event,
        }
    }
}

/// Both map layers plus the area that frames them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLayers {
    /// Earthquake markers.
    pub earthquakes: Vec<EarthquakeMarker>,
    /// Risk cell polygons.
    pub risk_cells: Vec<RiskCellPolygon>,
    /// Display bounds. `None` with fewer than two positions.
    pub bounds: Option<BoundingBox>,
    /// The risk collection's `metadata`, passed through for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_metadata: Option<serde_json::Value>,
}

impl MapLayers {
    /// Fuses feed features with an optional risk collection.
    ///
    /// Feed features are all treated as earthquakes. Risk collection
    /// features are partitioned by their `properties.type` discriminator.
    /// Anything that does not decode is skipped.
    #[must_use]
    pub fn fuse(earthquakes: &[serde_json::Value], risk: Option<&serde_json::Value>) -> Self {
        let mut markers: Vec<EarthquakeMarker> = earthquakes
            .iter()
            .filter_map(|value| match EarthquakeFeature::from_value(value) {
                Ok(feature) => EarthquakeMarker::from_feature(feature),
                Err(e) => {
                    log::debug!("Skipping undecodable earthquake feature: {e}");
                    None
                }
            })
            .collect();

        let mut risk_cells = Vec::new();
        let risk_features = risk
            .and_then(|r| r.get("features"))
            .and_then(serde_json::Value::as_array)
            .map_or(&[][..], Vec::as_slice);

        for feature in risk_features.iter().filter_map(MapFeature::decode) {
            match feature {
                MapFeature::Earthquake(quake) => {
                    markers.extend(EarthquakeMarker::from_feature(quake));
                }
                MapFeature::RiskCell(cell) => risk_cells.push(RiskCellPolygon::from(cell)),
            }
        }

        let bounds = compute_bounds(&markers, &risk_cells);

        log::debug!(
            "Fused {} markers and {} risk cells (bounds: {bounds:?})",
            markers.len(),
            risk_cells.len()
        );

        Self {
            earthquakes: markers,
            risk_cells,
            bounds,
            risk_metadata: risk.and_then(|r| r.get("metadata")).cloned(),
        }
    }

    /// Marker counts per tier, strongest first. Every tier is listed.
    #[must_use]
    pub fn tier_counts(&self) -> Vec<(MagnitudeTier, usize)> {
        MagnitudeTier::all()
            .iter()
            .map(|&tier| {
                let n = self.earthquakes.iter().filter(|m| m.tier == tier).count();
                (tier, n)
            })
            .collect()
    }

    /// Polygon counts per risk level, highest first. Every level is listed.
    #[must_use]
    pub fn level_counts(&self) -> Vec<(RiskLevel, usize)> {
        [RiskLevel::High, RiskLevel::Moderate, RiskLevel::Low]
            .into_iter()
            .map(|level| {
                let n = self.risk_cells.iter().filter(|c| c.level == level).count();
                (level, n)
            })
            .collect()
    }

    /// The risk collection's `metadata.error` diagnostic, if any.
    #[must_use]
    pub fn risk_error(&self) -> Option<&str> {
        self.risk_metadata
            .as_ref()
            .and_then(|m| m.get("error"))
            .and_then(serde_json::Value::as_str)
    }
}

/// Box around every marker and polygon vertex, or `None` when fewer than
/// two positions exist.
fn compute_bounds(markers: &[EarthquakeMarker], cells: &[RiskCellPolygon]) -> Option<BoundingBox> {
    let mut points: Vec<Point<f64>> = markers
        .iter()
        .map(|m| Point::new(m.longitude, m.latitude))
        .collect();

    for cell in cells {
        match geo::Geometry::<f64>::try_from(cell.geometry.clone()) {
            Ok(geometry) => points.extend(geometry.coords_iter().map(Point::from)),
            Err(e) => log::debug!("Risk cell {} has unusable geometry: {e}", cell.cell),
        }
    }

    if points.len() < 2 {
        return None;
    }

    MultiPoint::new(points)
        .bounding_rect()
        .map(|rect| BoundingBox {
            min_latitude: rect.min().y,
            max_latitude: rect.max().y,
            min_longitude: rect.min().x,
            max_longitude: rect.max().x,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quake(id: &str, mag: Option<f64>, lon: f64, lat: f64) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "id": id,
            "geometry": { "type": "Point", "coordinates": [lon, lat, 10.0] },
            "properties": { "mag": mag, "place": format!("near {id}"), "time": 1_717_000_000_000_i64 }
        })
    }

    fn cell(prob: f64, lon: f64, lat: f64) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[lon, lat], [lon + 1.0, lat], [lon + 1.0, lat + 1.0], [lon, lat + 1.0], [lon, lat]]]
            },
            "properties": {
                "type": "risk_cell",
                "cell": format!("{lat},{lon}"),
                "region": "Test",
                "risk_prob": prob,
                "risk_level": "low",
                "quake_count": 3
            }
        })
    }

    fn count(layers: &MapLayers, tier: MagnitudeTier) -> usize {
        layers
            .tier_counts()
            .into_iter()
            .find(|(t, _)| *t == tier)
            .map_or(0, |(_, n)| n)
    }

    #[test]
    fn california_result_buckets_every_marker() {
        let mags = [2.1, 3.0, 3.4, 3.9, 4.0, 4.2, 4.8, 5.1, 5.9, 3.3, 2.7, 6.4];
        let features: Vec<_> = mags
            .iter()
            .zip(0_u8..)
            .map(|(&m, i)| quake(&format!("ci{i}"), Some(m), f64::from(i).mul_add(0.1, -120.0), 36.0))
            .collect();

        let layers = MapLayers::fuse(&features, None);

        assert_eq!(layers.earthquakes.len(), 12);
        assert_eq!(count(&layers, MagnitudeTier::Major), 1);
        assert_eq!(count(&layers, MagnitudeTier::Strong), 5);
        assert_eq!(count(&layers, MagnitudeTier::Light), 6);
        assert_eq!(count(&layers, MagnitudeTier::Minor), 0);
        assert!(layers.earthquakes.iter().all(|m| m.color == m.tier.color()));
    }

    #[test]
    fn null_magnitude_is_minor() {
        let layers = MapLayers::fuse(&[quake("x", None, 0.0, 0.0)], None);
        assert_eq!(layers.earthquakes[0].tier, MagnitudeTier::Minor);
        assert_eq!(layers.earthquakes[0].color, "#9ca3af");
    }

    #[test]
    fn risk_level_ignores_reported_level() {
        let risk = serde_json::json!({
            "type": "FeatureCollection",
            "features": [cell(0.71, -120.0, 35.0), cell(0.70, -119.0, 35.0), cell(0.40, -118.0, 35.0)]
        });

        let layers = MapLayers::fuse(&[], Some(&risk));
        let levels: Vec<_> = layers.risk_cells.iter().map(|c| c.level).collect();

        assert_eq!(
            levels,
            [RiskLevel::High, RiskLevel::Moderate, RiskLevel::Low]
        );
        assert_eq!(layers.risk_cells[0].color, "#dc2626");
        assert_eq!(
            layers.level_counts(),
            [
                (RiskLevel::High, 1),
                (RiskLevel::Moderate, 1),
                (RiskLevel::Low, 1)
            ]
        );
    }

    #[test]
    fn merged_collection_is_partitioned_by_discriminator() {
        let mut inline_quake = quake("inf1", Some(4.5), -121.0, 37.0);
        inline_quake["properties"]["type"] = serde_json::json!("earthquake");
        let mut blast = quake("blast", Some(2.0), -121.0, 37.0);
        blast["properties"]["type"] = serde_json::json!("explosion");

        let risk = serde_json::json!({
            "type": "FeatureCollection",
            "features": [cell(0.5, -122.0, 36.0), inline_quake, blast],
            "metadata": { "region": "california" }
        });

        let layers = MapLayers::fuse(&[quake("usgs", Some(3.0), -118.0, 34.0)], Some(&risk));

        assert_eq!(layers.earthquakes.len(), 2);
        assert_eq!(layers.risk_cells.len(), 1);
        assert_eq!(layers.risk_metadata.as_ref().unwrap()["region"], "california");
        assert_eq!(layers.risk_error(), None);
    }

    #[test]
    fn single_position_has_no_bounds() {
        let layers = MapLayers::fuse(&[quake("one", Some(3.0), -118.0, 34.0)], None);
        assert_eq!(layers.bounds, None);

        let layers = MapLayers::fuse(&[], None);
        assert_eq!(layers.bounds, None);
    }

    #[test]
    fn bounds_cover_points_and_polygon_vertices() {
        let risk = serde_json::json!({ "features": [cell(0.2, -124.0, 40.0)] });
        let layers = MapLayers::fuse(
            &[
                quake("a", Some(3.0), -118.0, 34.0),
                quake("b", Some(3.0), -116.5, 33.0),
            ],
            Some(&risk),
        );

        assert_eq!(
            layers.bounds,
            Some(BoundingBox {
                min_latitude: 33.0,
                max_latitude: 41.0,
                min_longitude: -124.0,
                max_longitude: -116.5,
            })
        );
    }

    #[test]
    fn degraded_risk_payload_keeps_earthquakes() {
        let risk = serde_json::json!({
            "type": "FeatureCollection",
            "features": [],
            "metadata": { "error": "Could not reach the inference service" }
        });
        let layers = MapLayers::fuse(
            &[
                quake("a", Some(3.0), -118.0, 34.0),
                serde_json::json!({ "garbage": true }),
            ],
            Some(&risk),
        );

        assert_eq!(layers.earthquakes.len(), 1);
        assert!(layers.risk_cells.is_empty());
        assert_eq!(
            layers.risk_error(),
            Some("Could not reach the inference service")
        );
    }
}
