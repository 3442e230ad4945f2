#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the quake map.
//!
//! Serves the REST API the map frontend talks to: direct earthquake feed
//! queries, the risk overlay proxy, one-turn-at-a-time chat, and map layer
//! fusion for a transcript. The server holds no conversation state; clients
//! send their transcript with every chat and map request.

mod handlers;
pub mod interactive;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use quake_map_ai::providers::{LlmProvider, create_provider_from_env};
use quake_map_feed::{FeedConfig, UsgsFeed};
use quake_map_risk::{RiskConfig, RiskProxy};

/// Shared application state. Built once at startup and never mutated.
pub struct AppState {
    /// USGS feed client.
    pub feed: Arc<UsgsFeed>,
    /// Risk overlay proxy.
    pub risk: Arc<RiskProxy>,
    /// Chat model. `None` disables `/api/chat`.
    pub provider: Option<Arc<dyn LlmProvider>>,
}

impl AppState {
    /// Builds the state from environment configuration.
    ///
    /// A missing AI provider is not an error: chat is disabled and the
    /// other endpoints keep working.
    ///
    /// # Errors
    ///
    /// Returns an `std::io::Error` if an HTTP client cannot be built.
    pub fn from_env() -> std::io::Result<Self> {
        let feed_config = FeedConfig::from_env();
        log::info!("Earthquake feed: {}", feed_config.base_url);
        let feed = UsgsFeed::new(feed_config).map_err(std::io::Error::other)?;

        let risk_config = RiskConfig::from_env();
        log::info!("Inference service: {}", risk_config.inference_url);
        let risk = RiskProxy::new(risk_config).map_err(std::io::Error::other)?;

        let provider: Option<Arc<dyn LlmProvider>> = match create_provider_from_env() {
            Ok(provider) => Some(Arc::from(provider)),
            Err(e) => {
                log::warn!("Chat disabled: {e}");
                None
            }
        };

        Ok(Self {
            feed: Arc::new(feed),
            risk: Arc::new(risk),
            provider,
        })
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/regions", web::get().to(handlers::regions))
            .route("/earthquakes", web::get().to(handlers::earthquakes))
            .route("/risk-data", web::get().to(handlers::risk_data))
            .route("/chat", web::post().to(handlers::chat))
            .route("/map", web::post().to(handlers::map)),
    );
}

/// Starts the quake map API server.
///
/// Reads configuration from the environment and serves until shut down.
/// This is a regular async function; the caller provides the runtime
/// (e.g. via `#[actix_web::main]`) and initialises logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the state cannot be built, or the
/// HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    let state = web::Data::new(AppState::from_env()?);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
