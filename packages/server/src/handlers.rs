//! HTTP handler functions for the quake map API.

use actix_web::{HttpResponse, web};
use quake_map_ai::agent::run_turn;
use quake_map_feed::{get_earthquakes, today_utc};
use quake_map_fusion::MapLayers;
use quake_map_quake_models::Region;
use quake_map_server_models::{
    ApiEarthquakeCollection, ApiHealth, ApiRegion, ChatRequest, ChatResponse,
    EarthquakeQueryParams, MapRequest, RiskQueryParams,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/regions`
///
/// Lists the regions `getEarthquakes` accepts and their bounding boxes.
pub async fn regions() -> HttpResponse {
    let regions: Vec<ApiRegion> = Region::all().iter().copied().map(ApiRegion::from).collect();
    HttpResponse::Ok().json(regions)
}

/// `GET /api/earthquakes`
///
/// Runs one feed query with validated parameters.
pub async fn earthquakes(
    state: web::Data<AppState>,
    params: web::Query<EarthquakeQueryParams>,
) -> HttpResponse {
    match get_earthquakes(&state.feed, params.into_inner().into(), today_utc()).await {
        Ok(result) => {
            HttpResponse::Ok().json(ApiEarthquakeCollection::new(result.params, result.features))
        }
        Err(e) => {
            log::error!("Failed to query earthquake feed: {e}");
            HttpResponse::BadGateway().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
    }
}

/// `GET /api/risk-data`
///
/// Always 200. Failures come back as an empty collection with
/// `metadata.error`.
pub async fn risk_data(
    state: web::Data<AppState>,
    params: web::Query<RiskQueryParams>,
) -> HttpResponse {
    let response = state.risk.fetch(params.region.as_deref()).await;
    HttpResponse::Ok().json(response.body)
}

/// `POST /api/chat`
///
/// Runs one conversation turn against the client's transcript.
pub async fn chat(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> HttpResponse {
    let Some(provider) = &state.provider else {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "No AI provider configured. Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or AI_BASE_URL."
        }));
    };

    let ChatRequest {
        transcript,
        message,
    } = body.into_inner();

    if message.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "message must not be empty"
        }));
    }

    let outcome = run_turn(
        provider.as_ref(),
        &state.feed,
        &transcript,
        &message,
        today_utc(),
    )
    .await;

    let error = outcome.result.err().map(|e| {
        log::warn!("Chat turn ended early: {e}");
        e.to_string()
    });

    HttpResponse::Ok().json(ChatResponse {
        risk_region: outcome.transcript.risk_region(),
        transcript: outcome.transcript,
        answer: outcome.answer,
        error,
    })
}

/// `POST /api/map`
///
/// Fuses the latest earthquake query in the transcript with the risk
/// overlay for the same region.
pub async fn map(state: web::Data<AppState>, body: web::Json<MapRequest>) -> HttpResponse {
    let transcript = &body.transcript;
    let earthquakes = transcript
        .latest_earthquake_invocation()
        .map(|r| r.features())
        .unwrap_or_default();
    let region = transcript.risk_region();

    let risk = state.risk.fetch(Some(region.as_ref())).await;
    HttpResponse::Ok().json(MapLayers::fuse(earthquakes, Some(&risk.body)))
}
