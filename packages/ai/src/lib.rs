#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Chat agent with LLM provider abstraction and the `getEarthquakes` tool.
//!
//! Supports Anthropic Claude, `OpenAI`, and any `OpenAI`-compatible
//! local/self-hosted server (Ollama, vLLM, llama.cpp) via `AI_BASE_URL`.
//! One user message makes at most one earthquake feed request: the model
//! may ask for the tool once, the backend runs it, and a second model call
//! with tool calls disabled writes the answer.

pub mod agent;
pub mod providers;
pub mod tools;

use quake_map_conversation::Transcript;
use thiserror::Error;

/// Errors that can occur during AI operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request to LLM provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The earthquake feed request failed.
    #[error("Earthquake feed error: {0}")]
    Feed(#[from] quake_map_feed::FeedError),

    /// Provider-specific error.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

/// The result of one conversation turn, always carrying the extended
/// transcript regardless of whether the turn succeeded.
///
/// Callers own the transcript and must keep the returned one: it contains
/// the user's message and, when the tool ran, the invocation record the
/// map is rendered from.
pub struct TurnOutcome {
    /// The transcript with this turn's user and assistant turns appended.
    pub transcript: Transcript,

    /// The assistant's reply text. Empty when the model never answered.
    pub answer: String,

    /// `Ok(())` if the turn completed, or the error that ended it.
    pub result: Result<(), AiError>,
}
