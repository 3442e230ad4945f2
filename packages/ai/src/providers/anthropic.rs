//! Anthropic Claude provider implementation.

use serde::{Deserialize, Serialize};

use super::{
    ContentBlock, LlmProvider, LlmResponse, Message, MessageContent, ProviderSettings, StopReason,
    ToolChoice,
};
use crate::AiError;

const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: ProviderSettings) -> Result<Self, AiError> {
        let client = settings.client()?;
        Ok(Self { settings, client })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn to_api_message(message: &Message) -> AnthropicMessage<'_> {
    let content = match &message.content {
        MessageContent::Text(text) => serde_json::json!(text),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => serde_json::json!({ "type": "text", "text": text }),
                ContentBlock::ToolUse { id, name, input } => serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                }),
            })
            .collect(),
    };

    AnthropicMessage {
        role: &message.role,
        content,
    }
}

/// Tool definitions use `parameters`; Anthropic calls it `input_schema`.
fn to_api_tool(tool: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "name": tool["name"],
        "description": tool["description"],
        "input_schema": tool["parameters"],
    })
}

fn from_api_response(response: AnthropicResponse) -> LlmResponse {
    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(ContentBlock::Text { text }),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::ToolUse { id, name, input })
            }
            AnthropicContentBlock::Other => None,
        })
        .collect();

    let stop_reason = match response.stop_reason.as_deref() {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    };

    LlmResponse {
        content,
        stop_reason,
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[serde_json::Value],
        tool_choice: ToolChoice,
    ) -> Result<LlmResponse, AiError> {
        let request = AnthropicRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            system: system_prompt,
            messages: messages.iter().map(to_api_message).collect(),
            tools: tools.iter().map(to_api_tool).collect(),
            tool_choice: match tool_choice {
                ToolChoice::Disabled if !tools.is_empty() => {
                    Some(serde_json::json!({ "type": "none" }))
                }
                _ => None,
            },
        };

        let resp = self
            .client
            .post(self.settings.endpoint("v1/messages"))
            .header("x-api-key", self.settings.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map_or_else(|_| format!("HTTP {status}: {body}"), |e| e.error.message);
            return Err(AiError::Provider { message });
        }

        let response: AnthropicResponse = serde_json::from_str(&body)?;
        Ok(from_api_response(response))
    }

    fn label(&self) -> String {
        format!("anthropic/{}", self.settings.model)
    }
}
