//! LLM provider abstraction and implementations.
//!
//! Anthropic Claude and `OpenAI`-compatible chat APIs behind one trait.

pub mod anthropic;
pub mod openai;

use std::str::FromStr as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::AiError;

/// Default model for each provider when `AI_MODEL` is unset.
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A message in the provider conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Message content.
    pub content: MessageContent,
}

impl Message {
    /// A plain-text user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// A plain-text assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// A message made of content blocks.
    #[must_use]
    pub fn blocks(role: &str, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Content of a message: simple text or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Structured content blocks (tool calls and results).
    Blocks(Vec<ContentBlock>),
}

/// A structured content block within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content.
    Text {
        /// The text.
        text: String,
    },
    /// A tool use request from the assistant.
    ToolUse {
        /// Provider-assigned ID for this tool use.
        id: String,
        /// Tool name.
        name: String,
        /// Tool input parameters.
        input: serde_json::Value,
    },
    /// A tool result being sent back.
    ToolResult {
        /// The `tool_use` ID this result corresponds to.
        tool_use_id: String,
        /// The result content.
        content: String,
    },
}

/// Joins the text blocks of a response.
#[must_use]
pub fn extract_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Response from the LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Content blocks in the response.
    pub content: Vec<ContentBlock>,
    /// Why generation stopped.
    pub stop_reason: StopReason,
}

impl LlmResponse {
    /// Whether the response contains any tool use blocks.
    #[must_use]
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Model finished its response naturally.
    EndTurn,
    /// Model wants to call one or more tools.
    ToolUse,
    /// Maximum tokens reached.
    MaxTokens,
}

/// Whether the model may call tools on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// Tools stay defined, so history with tool blocks is accepted, but the
    /// model must answer in text.
    Disabled,
}

/// Trait for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request with tool definitions.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the request fails.
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[serde_json::Value],
        tool_choice: ToolChoice,
    ) -> Result<LlmResponse, AiError>;

    /// Short label for logs, e.g. `anthropic/claude-sonnet-4-20250514`.
    fn label(&self) -> String;
}

/// Supported provider APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum ProviderKind {
    /// Anthropic Messages API.
    #[strum(to_string = "anthropic", serialize = "claude")]
    Anthropic,
    /// `OpenAI` chat completions API, or a compatible local server.
    #[strum(to_string = "openai", serialize = "gpt")]
    OpenAi,
}

impl ProviderKind {
    const fn default_model(self) -> &'static str {
        match self {
            Self::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }

    const fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => DEFAULT_ANTHROPIC_URL,
            Self::OpenAi => DEFAULT_OPENAI_URL,
        }
    }

    const fn api_key_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Connection settings shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// API key. Optional only for self-hosted `OpenAI`-compatible servers.
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// API base URL without a trailing slash.
    pub base_url: String,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ProviderSettings {
    /// Defaults for `kind` with the given key.
    #[must_use]
    pub fn new(kind: ProviderKind, api_key: Option<String>) -> Self {
        Self {
            api_key,
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn client(&self) -> Result<reqwest::Client, AiError> {
        Ok(reqwest::Client::builder().timeout(self.timeout).build()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Creates an LLM provider based on environment variables.
///
/// If `AI_PROVIDER` is set, uses that provider. Otherwise auto-detects from
/// available credentials: `ANTHROPIC_API_KEY`, then `OPENAI_API_KEY`, then
/// an `AI_BASE_URL` pointing at a self-hosted `OpenAI`-compatible server.
/// `AI_MODEL`, `AI_BASE_URL`, `AI_MAX_TOKENS` and `AI_TIMEOUT_SECS`
/// override the defaults.
///
/// # Errors
///
/// Returns [`AiError::Config`] if no provider can be configured.
pub fn create_provider_from_env() -> Result<Box<dyn LlmProvider>, AiError> {
    let kind = match std::env::var("AI_PROVIDER") {
        Ok(name) => ProviderKind::from_str(name.trim()).map_err(|_| AiError::Config {
            message: format!("Unknown AI provider: {name}. Use 'anthropic' or 'openai'."),
        })?,
        Err(_) => detect_provider()?,
    };

    let base_url = std::env::var("AI_BASE_URL").ok();
    let api_key = std::env::var(kind.api_key_var()).ok();

    if api_key.is_none() && !(kind == ProviderKind::OpenAi && base_url.is_some()) {
        return Err(AiError::Config {
            message: format!("{} environment variable not set", kind.api_key_var()),
        });
    }

    let mut settings = ProviderSettings::new(kind, api_key);
    if let Some(base_url) = base_url {
        settings.base_url = base_url;
    }
    if let Ok(model) = std::env::var("AI_MODEL") {
        settings.model = model;
    }
    if let Some(max_tokens) = std::env::var("AI_MAX_TOKENS")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        settings.max_tokens = max_tokens;
    }
    if let Some(secs) = std::env::var("AI_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        settings.timeout = Duration::from_secs(secs);
    }

    create_provider(kind, settings)
}

/// Creates a provider of `kind` with explicit settings.
///
/// # Errors
///
/// Returns [`AiError::Http`] if the HTTP client cannot be built.
pub fn create_provider(
    kind: ProviderKind,
    settings: ProviderSettings,
) -> Result<Box<dyn LlmProvider>, AiError> {
    log::info!("Using AI provider {kind} ({} at {})", settings.model, settings.base_url);

    Ok(match kind {
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new(settings)?),
        ProviderKind::OpenAi => Box::new(openai::OpenAiProvider::new(settings)?),
    })
}

/// Picks a provider from the credentials present in the environment.
fn detect_provider() -> Result<ProviderKind, AiError> {
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        log::info!("Auto-detected AI provider: Anthropic (ANTHROPIC_API_KEY found)");
        return Ok(ProviderKind::Anthropic);
    }

    if std::env::var("OPENAI_API_KEY").is_ok() {
        log::info!("Auto-detected AI provider: OpenAI (OPENAI_API_KEY found)");
        return Ok(ProviderKind::OpenAi);
    }

    if std::env::var("AI_BASE_URL").is_ok() {
        log::info!("Auto-detected AI provider: OpenAI-compatible server (AI_BASE_URL found)");
        return Ok(ProviderKind::OpenAi);
    }

    Err(AiError::Config {
        message: "No AI credentials detected. Set ANTHROPIC_API_KEY, OPENAI_API_KEY, \
                  or AI_BASE_URL for a self-hosted server. You can also set AI_PROVIDER \
                  explicitly."
            .to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use actix_web::{App, HttpResponse, HttpServer, web};

    pub type Requests = Arc<Mutex<Vec<serde_json::Value>>>;

    /// Serves `body` for every POST and records each request body.
    pub fn spawn_llm(body: serde_json::Value) -> (String, Requests) {
        spawn_llm_sequence(vec![body])
    }

    /// Serves `bodies` in order, repeating the last one, and records each
    /// request body.
    pub fn spawn_llm_sequence(bodies: Vec<serde_json::Value>) -> (String, Requests) {
        assert!(!bodies.is_empty());
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let bodies = Arc::new(bodies);

        let server = HttpServer::new(move || {
            let requests = recorded.clone();
            let bodies = bodies.clone();
            App::new().default_service(web::to(move |req: web::Json<serde_json::Value>| {
                let requests = requests.clone();
                let bodies = bodies.clone();
                async move {
                    let mut requests = requests.lock().unwrap();
                    let body = bodies[requests.len().min(bodies.len() - 1)].clone();
                    requests.push(req.into_inner());
                    HttpResponse::Ok().json(body)
                }
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let url = format!("http://{}", server.addrs()[0]);
        actix_web::rt::spawn(server.run());
        (url, requests)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn provider_kind_accepts_aliases() {
        assert_eq!(ProviderKind::from_str("Claude").unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::from_str("OPENAI").unwrap(), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from_str("gpt").unwrap(), ProviderKind::OpenAi);
        assert!(ProviderKind::from_str("bedrock").is_err());
    }

    #[test]
    fn extract_text_skips_tool_blocks_and_blanks() {
        let blocks = vec![
            ContentBlock::Text {
                text: "Looking.".to_string(),
            },
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "getEarthquakes".to_string(),
                input: serde_json::json!({}),
            },
            ContentBlock::Text {
                text: "  ".to_string(),
            },
            ContentBlock::Text {
                text: "Done.".to_string(),
            },
        ];
        assert_eq!(extract_text(&blocks), "Looking.\nDone.");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let mut settings = ProviderSettings::new(ProviderKind::OpenAi, None);
        settings.base_url = "http://localhost:11434/v1/".to_string();
        assert_eq!(
            settings.endpoint("chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
