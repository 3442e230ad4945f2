#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the quake map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the domain types to allow independent evolution of the API
//! contract.

use chrono::{DateTime, Utc};
use quake_map_conversation::Transcript;
use quake_map_quake_models::{BoundingBox, QueryParameters, RawQueryArgs, Region};
use serde::{Deserialize, Deserializer, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// A supported region and its bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRegion {
    /// Region token accepted by `getEarthquakes`.
    pub name: Region,
    /// Bounding box applied to feed queries.
    pub bounds: BoundingBox,
}

impl From<Region> for ApiRegion {
    fn from(region: Region) -> Self {
        Self {
            name: region,
            bounds: region.bounding_box(),
        }
    }
}

/// Query parameters for the earthquakes endpoint.
///
/// Numbers are read leniently: a value that is not a number is treated as
/// missing and takes its default instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarthquakeQueryParams {
    /// Minimum magnitude, clamped into `[0, 10]`.
    #[serde(default, deserialize_with = "lenient_number")]
    pub min_magnitude: Option<f64>,
    /// Days to look back, rounded and clamped into `[1, 90]`.
    #[serde(default, deserialize_with = "lenient_number")]
    pub days: Option<f64>,
    /// Region token. Unsupported values are ignored.
    pub region: Option<String>,
}

/// A number as it may arrive in a query string or JSON body.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LenientNumber>::deserialize(deserializer)? {
        Some(LenientNumber::Number(n)) => Some(n),
        Some(LenientNumber::Text(s)) => s.trim().parse().ok(),
        Some(LenientNumber::Other(_)) | None => None,
    })
}

impl From<EarthquakeQueryParams> for RawQueryArgs {
    fn from(params: EarthquakeQueryParams) -> Self {
        Self {
            min_magnitude: params.min_magnitude,
            days: params.days,
            region: params.region,
        }
    }
}

/// Metadata attached to an earthquake collection response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEarthquakeMetadata {
    /// The validated parameters the feed was queried with.
    pub query: QueryParameters,
    /// Number of features returned.
    pub count: usize,
    /// When the response was generated.
    pub generated: DateTime<Utc>,
}

/// `GeoJSON` collection of feed features, passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEarthquakeCollection {
    /// Always `FeatureCollection`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Feed features.
    pub features: Vec<serde_json::Value>,
    /// Query metadata.
    pub metadata: ApiEarthquakeMetadata,
}

impl ApiEarthquakeCollection {
    /// Wraps feed features with their query parameters.
    #[must_use]
    pub fn new(query: QueryParameters, features: Vec<serde_json::Value>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            metadata: ApiEarthquakeMetadata {
                query,
                count: features.len(),
                generated: Utc::now(),
            },
            features,
        }
    }
}

/// Query parameters for the risk data endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskQueryParams {
    /// Region to run live inference for. Absent or blank serves the
    /// precomputed file.
    pub region: Option<String>,
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The conversation so far. Owned by the client.
    #[serde(default)]
    pub transcript: Transcript,
    /// The new user message.
    pub message: String,
}

/// Response body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// The extended transcript. Clients send it back on the next turn.
    pub transcript: Transcript,
    /// The assistant's reply.
    pub answer: String,
    /// What ended the turn early, if anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Region the map's risk overlay should be fetched for.
    pub risk_region: Region,
}

/// Request body for `POST /api/map`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapRequest {
    /// The conversation whose latest earthquake query is rendered.
    #[serde(default)]
    pub transcript: Transcript,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_lists_bounds() {
        let json = serde_json::to_value(ApiRegion::from(Region::California)).unwrap();
        assert_eq!(json["name"], "california");
        assert_eq!(json["bounds"]["minLatitude"], 32.0);
        assert_eq!(json["bounds"]["maxLongitude"], -114.0);
    }

    #[test]
    fn earthquake_params_ignore_non_numeric_values() {
        let params: EarthquakeQueryParams = serde_json::from_value(serde_json::json!({
            "minMagnitude": " 4.5 ",
            "days": "week",
            "region": "california"
        }))
        .unwrap();
        assert_eq!(params.min_magnitude, Some(4.5));
        assert_eq!(params.days, None);

        let params: EarthquakeQueryParams =
            serde_json::from_value(serde_json::json!({ "minMagnitude": 3, "days": true }))
                .unwrap();
        assert_eq!(params.min_magnitude, Some(3.0));
        assert_eq!(params.days, None);

        let params: EarthquakeQueryParams =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.min_magnitude, None);
        assert_eq!(params.region, None);
    }

    #[test]
    fn chat_request_transcript_defaults_to_empty() {
        let request: ChatRequest =
            serde_json::from_value(serde_json::json!({ "message": "hi" })).unwrap();
        assert!(request.transcript.is_empty());
    }

    #[test]
    fn earthquake_collection_counts_features() {
        let collection = ApiEarthquakeCollection::new(
            QueryParameters::default(),
            vec![serde_json::json!({}), serde_json::json!({})],
        );
        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["metadata"]["count"], 2);
        assert_eq!(json["metadata"]["query"]["days"], 7);
    }
}
