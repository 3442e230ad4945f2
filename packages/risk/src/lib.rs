#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk overlay proxy.
//!
//! With a region, the proxy forwards to the inference service's
//! `/risk-data` endpoint. Without one, it serves the precomputed
//! `earthquake_risk.geojson` from the public assets directory or the
//! repository root. Whatever goes wrong, callers get a well-formed
//! `FeatureCollection`: failures become an empty collection whose
//! `metadata.error` explains what happened. The map must keep working when
//! the inference sidecar is down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Where the inference service listens when `INFERENCE_API_URL` is unset.
pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:8001";

/// File name of the precomputed risk overlay.
pub const RISK_FILE_NAME: &str = "earthquake_risk.geojson";

/// Public assets directory searched first for the precomputed overlay.
const DEFAULT_PUBLIC_DIR: &str = "public";

/// Request timeout used when `INFERENCE_TIMEOUT_SECS` is unset.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum length of an upstream error body carried into a diagnostic.
const BODY_PREVIEW_LEN: usize = 500;

/// Reasons the proxy falls back to an empty collection.
#[derive(Debug, Error)]
pub enum RiskError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// The inference service could not be reached.
    #[error("Could not reach the inference service at {url}: {source}")]
    Unreachable {
        /// Configured service base URL.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },

    /// The inference service answered with a non-success status.
    #[error("Inference service returned HTTP {status}: {detail}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body.
        detail: String,
    },

    /// No precomputed file exists at any candidate path.
    #[error(
        "No precomputed risk data found (looked in {candidates}). \
         Ask about a region to run live inference."
    )]
    MissingStaticFile {
        /// Candidate paths, comma separated.
        candidates: String,
    },

    /// A precomputed file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The payload is not JSON.
    #[error("Risk data from {origin} is not valid JSON: {source}")]
    Json {
        /// Service URL or file path.
        origin: String,
        /// Parse error.
        source: serde_json::Error,
    },

    /// The payload is JSON but not a feature collection.
    #[error("Risk data from {origin} has no features array")]
    InvalidShape {
        /// Service URL or file path.
        origin: String,
    },
}

/// Proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskConfig {
    /// Inference service base URL.
    pub inference_url: String,
    /// Per-request timeout for the inference service.
    pub timeout: Duration,
    /// Precomputed overlay paths, in lookup order.
    pub static_files: Vec<PathBuf>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            static_files: default_static_files(Path::new(DEFAULT_PUBLIC_DIR)),
        }
    }
}

impl RiskConfig {
    /// Reads `INFERENCE_API_URL`, `INFERENCE_TIMEOUT_SECS` and
    /// `RISK_PUBLIC_DIR` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let inference_url = std::env::var("INFERENCE_API_URL")
            .unwrap_or_else(|_| DEFAULT_INFERENCE_URL.to_string());
        let timeout_secs = std::env::var("INFERENCE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let public_dir =
            std::env::var("RISK_PUBLIC_DIR").unwrap_or_else(|_| DEFAULT_PUBLIC_DIR.to_string());

        Self {
            inference_url,
            timeout: Duration::from_secs(timeout_secs),
            static_files: default_static_files(Path::new(&public_dir)),
        }
    }
}

/// The public assets copy first, then the repository-root copy.
#[must_use]
pub fn default_static_files(public_dir: &Path) -> Vec<PathBuf> {
    vec![public_dir.join(RISK_FILE_NAME), PathBuf::from(RISK_FILE_NAME)]
}

/// Which terminal state produced a [`RiskResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskSource {
    /// Live inference for the requested region.
    Service,
    /// The precomputed file at this path.
    StaticFile(PathBuf),
    /// Empty collection carrying a diagnostic.
    Degraded,
}

/// A risk overlay payload. Always a `GeoJSON` `FeatureCollection`.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskResponse {
    /// How the payload was obtained.
    pub source: RiskSource,
    /// The collection, passed through untouched unless degraded.
    pub body: serde_json::Value,
}

impl RiskResponse {
    /// An empty collection whose `metadata.error` is `message`.
    #[must_use]
    pub fn degraded(message: &str) -> Self {
        Self {
            source: RiskSource::Degraded,
            body: serde_json::json!({
                "type": "FeatureCollection",
                "features": [],
                "metadata": { "error": message },
            }),
        }
    }

    /// The `metadata.error` diagnostic, if any.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("error"))
            .and_then(serde_json::Value::as_str)
    }

    /// Number of features in the collection.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.body
            .get("features")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Proxy in front of the inference service and the precomputed overlay.
pub struct RiskProxy {
    client: reqwest::Client,
    config: RiskConfig,
}

impl RiskProxy {
    /// Creates a proxy.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::Client`] if the HTTP client cannot be built.
    pub fn new(config: RiskConfig) -> Result<Self, RiskError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Fetches the overlay for `region`, or the precomputed overlay when
    /// `region` is absent or blank. Never fails.
    pub async fn fetch(&self, region: Option<&str>) -> RiskResponse {
        let region = region.map(str::trim).filter(|r| !r.is_empty());

        let result = match region {
            Some(region) => self
                .fetch_from_service(region)
                .await
                .map(|body| (RiskSource::Service, body)),
            None => self
                .read_static_file()
                .await
                .map(|(path, body)| (RiskSource::StaticFile(path), body)),
        };

        match result {
            Ok((source, body)) => {
                log::debug!("Serving risk data from {source:?}");
                RiskResponse { source, body }
            }
            Err(e) => {
                log::warn!("Serving empty risk data: {e}");
                RiskResponse::degraded(&e.to_string())
            }
        }
    }

    async fn fetch_from_service(&self, region: &str) -> Result<serde_json::Value, RiskError> {
        let url = format!(
            "{}/risk-data",
            self.config.inference_url.trim_end_matches('/')
        );
        let unreachable = |source| RiskError::Unreachable {
            url: self.config.inference_url.clone(),
            source,
        };

        log::info!("Requesting risk data for region '{region}' from {url}");

        let resp = self
            .client
            .get(&url)
            .query(&[("region", region)])
            .send()
            .await
            .map_err(unreachable)?;

        let status = resp.status();
        let text = resp.text().await.map_err(unreachable)?;

        if !status.is_success() {
            return Err(RiskError::Upstream {
                status: status.as_u16(),
                detail: upstream_detail(&text),
            });
        }

        parse_collection(&text, &url)
    }

    async fn read_static_file(&self) -> Result<(PathBuf, serde_json::Value), RiskError> {
        for path in &self.config.static_files {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    let origin = path.display().to_string();
                    return parse_collection(&text, &origin).map(|body| (path.clone(), body));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(RiskError::Io {
                        path: path.display().to_string(),
                        source,
                    });
                }
            }
        }

        Err(RiskError::MissingStaticFile {
            candidates: self
                .config
                .static_files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Parses `text` and checks it has a `features` array.
fn parse_collection(text: &str, origin: &str) -> Result<serde_json::Value, RiskError> {
    let body: serde_json::Value = serde_json::from_str(text).map_err(|source| RiskError::Json {
        origin: origin.to_string(),
        source,
    })?;

    if body.get("features").is_some_and(serde_json::Value::is_array) {
        Ok(body)
    } else {
        Err(RiskError::InvalidShape {
            origin: origin.to_string(),
        })
    }
}

/// Extracts a readable message from an error body. Prefers the `detail`
/// field `FastAPI` uses, then `error`, then the raw (truncated) text.
fn upstream_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(serde_json::Value::as_str).map(String::from))
        });

    from_json.unwrap_or_else(|| {
        if body.chars().count() > BODY_PREVIEW_LEN {
            let cut: String = body.chars().take(BODY_PREVIEW_LEN).collect();
            format!("{cut}...")
        } else if body.is_empty() {
            "(empty response body)".to_string()
        } else {
            body.to_string()
        }
    })
}
