//! `OpenAI` chat completions provider, also used for compatible local
//! servers.

use serde::{Deserialize, Serialize};

use super::{
    ContentBlock, LlmProvider, LlmResponse, Message, MessageContent, ProviderSettings, StopReason,
    ToolChoice, extract_text,
};
use crate::AiError;

/// `OpenAI` API provider.
pub struct OpenAiProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new `OpenAI` provider.
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
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiToolCall {
    /// Some compatible servers omit it; the agent fills in an id.
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    call_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: serde_json::Value,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

/// Flattens the provider-neutral history into chat completion messages.
///
/// Assistant tool use blocks become `tool_calls`; each tool result becomes
/// its own `tool` message.
fn to_api_messages(system_prompt: &str, messages: &[Message]) -> Vec<OpenAiMessage> {
    let mut api_messages = vec![OpenAiMessage::text("system", system_prompt.to_string())];

    for msg in messages {
        match &msg.content {
            MessageContent::Text(text) => {
                api_messages.push(OpenAiMessage::text(&msg.role, text.clone()));
            }
            MessageContent::Blocks(blocks) if msg.role == "assistant" => {
                let tool_calls: Vec<OpenAiToolCall> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, input } => Some(OpenAiToolCall {
                            id: id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAiFunction {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();
                let text = extract_text(blocks);

                api_messages.push(OpenAiMessage {
                    role: "assistant".to_string(),
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                });
            }
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                        } => api_messages.push(OpenAiMessage {
                            role: "tool".to_string(),
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        }),
                        ContentBlock::Text { text } => {
                            api_messages.push(OpenAiMessage::text(&msg.role, text.clone()));
                        }
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
            }
        }
    }

    api_messages
}

fn from_api_choice(choice: OpenAiChoice) -> LlmResponse {
    let mut content = Vec::new();

    if let Some(text) = choice.message.content
        && !text.is_empty()
    {
        content.push(ContentBlock::Text { text });
    }

    for tc in choice.message.tool_calls.unwrap_or_default() {
        let input = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
            log::warn!(
                "Tool call {} has unparseable arguments ({e}); using none",
                tc.function.name
            );
            serde_json::json!({})
        });
        content.push(ContentBlock::ToolUse {
            id: tc.id,
            name: tc.function.name,
            input,
        });
    }

    let has_tool_use = content
        .iter()
        .any(|b| matches!(b, ContentBlock::ToolUse { .. }));

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ if has_tool_use => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    };

    LlmResponse {
        content,
        stop_reason,
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[serde_json::Value],
        tool_choice: ToolChoice,
    ) -> Result<LlmResponse, AiError> {
        let request = OpenAiRequest {
            model: &self.settings.model,
            messages: to_api_messages(system_prompt, messages),
            tools: tools
                .iter()
                .map(|t| OpenAiTool {
                    tool_type: "function",
                    function: t.clone(),
                })
                .collect(),
            tool_choice: match tool_choice {
                ToolChoice::Disabled if !tools.is_empty() => Some("none"),
                _ => None,
            },
            max_tokens: self.settings.max_tokens,
        };

        let mut req = self
            .client
            .post(self.settings.endpoint("chat/completions"))
            .json(&request);
        if let Some(api_key) = &self.settings.api_key {
            req = req.bearer_auth(api_key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiError>(&body)
                .map_or_else(|_| format!("HTTP {status}: {body}"), |e| e.error.message);
            return Err(AiError::Provider { message });
        }

        let response: OpenAiResponse = serde_json::from_str(&body)?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Provider {
                message: "No choices in OpenAI response".to_string(),
            })?;

        Ok(from_api_choice(choice))
    }

    fn label(&self) -> String {
        format!("openai/{}", self.settings.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use crate::providers::test_support::spawn_llm;

    #[test]
    fn tool_round_trip_history_is_flattened() {
        let messages = vec![
            Message::user("quakes in california?"),
            Message::blocks(
                "assistant",
                vec![ContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "getEarthquakes".to_string(),
                    input: serde_json::json!({ "region": "california" }),
                }],
            ),
            Message::blocks(
                "user",
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".to_string(),
                    content: "{\"count\":3}".to_string(),
                }],
            ),
        ];

        let api = to_api_messages("sys", &messages);
        assert_eq!(api.len(), 4);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[2].content, None);
        assert_eq!(api[2].tool_calls.as_ref().unwrap()[0].function.name, "getEarthquakes");
        assert_eq!(api[3].role, "tool");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[actix_web::test]
    async fn local_server_without_key_parses_tool_calls() {
        let (url, requests) = spawn_llm(serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "getEarthquakes", "arguments": "{\"minMagnitude\":4}" }
                    }]
                },
                "finish_reason": "stop"
            }]
        }));

        let mut settings = ProviderSettings::new(ProviderKind::OpenAi, None);
        settings.base_url = format!("{url}/v1/");
        let provider = OpenAiProvider::new(settings).unwrap();

        let response = provider
            .chat(
                "sys",
                &[Message::user("big ones")],
                &crate::tools::tool_definitions(),
                ToolChoice::Auto,
            )
            .await
            .unwrap();

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(
            response.content,
            [ContentBlock::ToolUse {
                id: "call_9".to_string(),
                name: "getEarthquakes".to_string(),
                input: serde_json::json!({ "minMagnitude": 4 }),
            }]
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0]["tools"][0]["type"], "function");
        assert_eq!(requests[0]["tools"][0]["function"]["name"], "getEarthquakes");
        assert!(requests[0].get("tool_choice").is_none());
    }

    #[actix_web::test]
    async fn tool_call_without_id_or_type_still_parses() {
        let (url, requests) = spawn_llm(serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "function": { "name": "getEarthquakes", "arguments": "{}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }));

        let mut settings = ProviderSettings::new(ProviderKind::OpenAi, None);
        settings.base_url = url;
        let provider = OpenAiProvider::new(settings).unwrap();

        let response = provider
            .chat(
                "sys",
                &[Message::user("recent")],
                &crate::tools::tool_definitions(),
                ToolChoice::Disabled,
            )
            .await
            .unwrap();

        assert_eq!(
            response.content,
            [ContentBlock::ToolUse {
                id: String::new(),
                name: "getEarthquakes".to_string(),
                input: serde_json::json!({}),
            }]
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0]["tool_choice"], "none");
        assert_eq!(requests[0]["tools"][0]["function"]["name"], "getEarthquakes");
    }
}
