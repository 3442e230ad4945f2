#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! USGS earthquake feed client backing the `getEarthquakes` tool.
//!
//! Every invocation makes exactly one request. There is no retry: a failed
//! call is terminal for the conversation turn that issued it, and the user
//! is told so. The feed's `features` array is returned verbatim.

pub mod query;

use std::time::Duration;

use chrono::NaiveDate;
use quake_map_quake_models::{QueryParameters, RawQueryArgs};
use thiserror::Error;

pub use query::{FeedQuery, today_utc};

/// Public USGS FDSN event endpoint.
pub const DEFAULT_FEED_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";

/// Request timeout used when `FEED_TIMEOUT_SECS` is unset.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors from the earthquake feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The feed answered with a non-success status.
    #[error("Earthquake feed returned HTTP {status}")]
    Upstream {
        /// HTTP status code.
        status: u16,
    },
}

/// Connection settings for the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Query endpoint URL.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEED_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FeedConfig {
    /// Reads `USGS_FEED_URL` and `FEED_TIMEOUT_SECS`, falling back to the
    /// public endpoint and a 30 second timeout.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("USGS_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
        let timeout_secs = std::env::var("FEED_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Client for the USGS earthquake feed.
pub struct UsgsFeed {
    client: reqwest::Client,
    base_url: String,
}

impl UsgsFeed {
    /// Creates a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the HTTP client cannot be built.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// The endpoint this client queries.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one query and returns the raw `features` array.
    ///
    /// A body without a `features` array yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Upstream`] for non-success statuses and
    /// [`FeedError::Http`] for transport or body-decoding failures.
    pub async fn fetch(&self, query: &FeedQuery) -> Result<Vec<serde_json::Value>, FeedError> {
        let pairs = query.to_query_pairs();
        log::debug!("Querying earthquake feed {} with {pairs:?}", self.base_url);

        let resp = self.client.get(&self.base_url).query(&pairs).send().await?;

        let status = resp.status();
        if !status.is_success() {
            log::warn!("Earthquake feed returned HTTP {status}");
            return Err(FeedError::Upstream {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let features = match body {
            serde_json::Value::Object(mut map) => match map.remove("features") {
                Some(serde_json::Value::Array(features)) => features,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        log::info!("Earthquake feed returned {} features", features.len());
        Ok(features)
    }
}

/// Result of a `getEarthquakes` invocation.
#[derive(Debug, Clone)]
pub struct EarthquakeResult {
    /// The parameters actually queried, after validation.
    pub params: QueryParameters,
    /// Feed features, unmodified.
    pub features: Vec<serde_json::Value>,
}

/// Runs the `getEarthquakes` tool: validate, build, fetch.
///
/// # Errors
///
/// Returns [`FeedError`] if the single feed request fails.
pub async fn get_earthquakes(
    feed: &UsgsFeed,
    args: RawQueryArgs,
    today: NaiveDate,
) -> Result<EarthquakeResult, FeedError> {
    let params = QueryParameters::from_raw(args);
    let query = FeedQuery::build(&params, today);
    let features = feed.fetch(&query).await?;

    Ok(EarthquakeResult { params, features })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::http::StatusCode;
    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
    use quake_map_quake_models::Region;

    use super::*;

    /// Serves `body` with `status` for every request and records each
    /// request's query string.
    fn spawn_feed(status: u16, body: serde_json::Value) -> (String, Arc<Mutex<Vec<String>>>) {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let recorded = hits.clone();

        let server = HttpServer::new(move || {
            let hits = recorded.clone();
            let body = body.clone();
            App::new().default_service(web::to(move |req: HttpRequest| {
                let hits = hits.clone();
                let body = body.clone();
                async move {
                    hits.lock().unwrap().push(req.query_string().to_string());
                    HttpResponse::build(StatusCode::from_u16(status).unwrap()).json(body)
                }
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let url = format!("http://{}/fdsnws/event/1/query", server.addrs()[0]);
        actix_web::rt::spawn(server.run());
        (url, hits)
    }

    fn feed(url: String) -> UsgsFeed {
        UsgsFeed::new(FeedConfig {
            base_url: url,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[actix_web::test]
    async fn passes_features_through_with_one_request() {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                { "id": "a", "geometry": null, "properties": { "mag": 3.2 } },
                { "anything": "goes" }
            ]
        });
        let (url, hits) = spawn_feed(200, body);

        let result = get_earthquakes(
            &feed(url),
            RawQueryArgs {
                min_magnitude: Some(14.0),
                days: Some(0.4),
                region: Some("california".to_string()),
            },
            today(),
        )
        .await
        .unwrap();

        assert_eq!(result.features.len(), 2);
        assert_eq!(result.features[1]["anything"], "goes");
        assert_eq!(result.params.region, Some(Region::California));

        let hits = hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("minmagnitude=10"));
        assert!(hits[0].contains("starttime=2025-05-31"));
        assert!(hits[0].contains("maxlongitude=-114"));
    }

    #[actix_web::test]
    async fn missing_features_field_is_empty() {
        let (url, _) = spawn_feed(200, serde_json::json!({ "type": "FeatureCollection" }));
        let result = get_earthquakes(&feed(url), RawQueryArgs::default(), today())
            .await
            .unwrap();
        assert!(result.features.is_empty());
    }

    #[actix_web::test]
    async fn non_success_status_is_upstream_error_without_retry() {
        let (url, hits) = spawn_feed(503, serde_json::json!({ "error": "busy" }));
        let err = get_earthquakes(&feed(url), RawQueryArgs::default(), today())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::Upstream { status: 503 }));
        assert_eq!(hits.lock().unwrap().len(), 1);
    }
}
