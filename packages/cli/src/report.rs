//! Plain-text rendering of query and risk results for the terminal.

use std::fmt::Write as _;

use quake_map_fusion::MapLayers;
use quake_map_quake_models::QueryParameters;
use quake_map_risk::{RiskResponse, RiskSource};

/// Strongest events listed under the tier table.
const MAX_LISTED: usize = 10;

/// Describes a query the way a user would phrase it.
#[must_use]
pub fn describe_query(params: &QueryParameters) -> String {
    let area = params
        .region
        .map_or_else(|| "worldwide".to_string(), |r| format!("in {r}"));
    format!(
        "M{}+ {area} over the last {} day(s)",
        params.min_magnitude, params.days
    )
}

/// Tier breakdown followed by the strongest events.
#[must_use]
pub fn format_earthquakes(params: &QueryParameters, layers: &MapLayers) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} earthquake(s), {}",
        layers.earthquakes.len(),
        describe_query(params)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<8} {:<8} {:>6}", "TIER", "COLOUR", "COUNT");
    for (tier, count) in layers.tier_counts() {
        let _ = writeln!(out, "{:<8} {:<8} {count:>6}", tier.as_ref(), tier.color());
    }

    let mut strongest: Vec<_> = layers
        .earthquakes
        .iter()
        .filter(|m| m.magnitude.is_some())
        .collect();
    strongest.sort_by(|a, b| {
        b.magnitude
            .partial_cmp(&a.magnitude)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if !strongest.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Strongest:");
        for m in strongest.into_iter().take(MAX_LISTED) {
            let _ = writeln!(
                out,
                "  M{:<4} {:<20} {}",
                m.magnitude.unwrap_or_default(),
                m.time.as_ref().map(ToString::to_string).unwrap_or_default(),
                m.place.as_deref().unwrap_or("(unknown place)")
            );
        }
    }

    if let Some(b) = &layers.bounds {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Bounds: lat {:.2} to {:.2}, lon {:.2} to {:.2}",
            b.min_latitude, b.max_latitude, b.min_longitude, b.max_longitude
        );
    }

    out
}

/// Where the overlay came from, how many cells it has per level, and any
/// diagnostic.
#[must_use]
pub fn format_risk(response: &RiskResponse) -> String {
    let mut out = String::new();

    let source = match &response.source {
        RiskSource::Service => "inference service".to_string(),
        RiskSource::StaticFile(path) => format!("precomputed file {}", path.display()),
        RiskSource::Degraded => "unavailable".to_string(),
    };
    let _ = writeln!(out, "Risk overlay: {source}");
    let _ = writeln!(out, "{} cell(s)", response.feature_count());

    let layers = MapLayers::fuse(&[], Some(&response.body));
    if !layers.risk_cells.is_empty() {
        for (level, count) in layers.level_counts() {
            let _ = writeln!(out, "  {:<9} {count}", level.as_ref());
        }
    }

    if let Some(metadata) = &layers.risk_metadata {
        for key in ["model", "data_window", "disclaimer"] {
            if let Some(value) = metadata.get(key).and_then(serde_json::Value::as_str) {
                let _ = writeln!(out, "{key}: {value}");
            }
        }
    }

    if let Some(diagnostic) = response.diagnostic() {
        let _ = writeln!(out, "error: {diagnostic}");
    }

    out
}
