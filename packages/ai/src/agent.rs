//! One conversation turn.
//!
//! User message -> model decides whether to query -> at most one
//! `getEarthquakes` feed request -> model writes the answer with tool calls
//! disabled.
//! The turn never makes more than two model calls or one feed call.

use chrono::NaiveDate;
use quake_map_conversation::{
    GET_EARTHQUAKES, InvocationState, ToolInvocationRecord, Transcript, Turn,
};
use quake_map_feed::{FeedQuery, UsgsFeed};
use quake_map_fusion::MapLayers;
use quake_map_quake_models::{QueryParameters, RawQueryArgs, Region};

use crate::providers::{
    ContentBlock, LlmProvider, Message, StopReason, ToolChoice, extract_text,
};
use crate::tools::tool_definitions;
use crate::{AiError, TurnOutcome};

/// Shown to the user when the feed request fails. The turn ends there.
pub const FEED_FAILURE_MESSAGE: &str = "Sorry, I couldn't reach the USGS earthquake feed just now, \
     so there is no new data to show. Please try again in a moment.";

/// Tool result for tool calls beyond the first in one message.
const SKIPPED_TOOL_MESSAGE: &str =
    "Not executed: only one earthquake query is allowed per user message.";

/// Tool result replayed for a past call that never completed.
const FAILED_TOOL_MESSAGE: &str = "The earthquake feed request failed; no data was returned.";

/// Maximum size of a tool result string before truncation.
const MAX_TOOL_RESULT_BYTES: usize = 8000;

/// Events listed individually in a tool result, strongest first.
const MAX_LISTED_EVENTS: usize = 10;

fn build_system_prompt(today: NaiveDate) -> String {
    let regions = Region::all()
        .iter()
        .map(|r| {
            let b = r.bounding_box();
            format!(
                "{r} (lat {} to {}, lon {} to {})",
                b.min_latitude, b.max_latitude, b.min_longitude, b.max_longitude
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        r"You are an earthquake assistant for a live map. You help users explore recent seismic activity using the USGS earthquake feed.

## Tool
- getEarthquakes(minMagnitude, days, region) fetches recent earthquakes and draws them on the user's map.
- Supported regions: {regions}. Omit the region for a worldwide query.
- minMagnitude is 0 to 10, days is 1 to 90. Out-of-range values are clamped.

## Instructions
1. Call getEarthquakes at most once per user message. Never repeat a query the user did not ask for.
2. Do NOT make up earthquakes or statistics. Only cite numbers from tool results.
3. If the user asks about a region that is not supported, say so and offer a worldwide query instead.
4. Map markers are coloured by magnitude: red for 6 and above, orange for 4 to 6, yellow for 2 to 4, gray below 2.
5. The map also shows a risk overlay of grid cells coloured by model probability (red above 0.7, orange above 0.4, green otherwise). It is an experimental model output, not a forecast.
6. Today's date is {today}. Interpret relative dates from today.

Be concise. Summarise counts and the strongest events rather than listing every earthquake."
    )
}

/// Runs one conversation turn.
///
/// The returned transcript always contains the user message. An assistant
/// turn is appended whenever the model answered or the tool ran; a failed
/// feed call is recorded as a pending invocation next to an apology.
pub async fn run_turn(
    provider: &dyn LlmProvider,
    feed: &UsgsFeed,
    transcript: &Transcript,
    message: &str,
    today: NaiveDate,
) -> TurnOutcome {
    let transcript = transcript.clone().with_turn(Turn::user(message));
    let system_prompt = build_system_prompt(today);
    let tools = tool_definitions();
    let mut messages = transcript_to_messages(&transcript);

    log::info!(
        "Chat turn {} via {}",
        transcript.len(),
        provider.label()
    );

    let first = match provider
        .chat(&system_prompt, &messages, &tools, ToolChoice::Auto)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            log::error!("Model call failed: {e}");
            return TurnOutcome {
                transcript,
                answer: String::new(),
                result: Err(e),
            };
        }
    };
    if first.stop_reason == StopReason::MaxTokens {
        log::warn!("Model response hit the token limit; the reply may be cut short");
    }
    let wanted_tool = first.has_tool_use();
    let first_content = assign_missing_ids(first.content);

    let Some((call_id, input)) = first_earthquake_call(&first_content) else {
        if wanted_tool {
            log::warn!("Model requested an unknown tool; treating its text as the answer");
        }
        return finish(transcript, extract_text(&first_content), Vec::new(), Ok(()));
    };

    let params = QueryParameters::from_raw(parse_tool_args(&input));
    log::info!("getEarthquakes({call_id}): {params:?}");

    let record = ToolInvocationRecord::pending(call_id.clone(), GET_EARTHQUAKES, params);
    let features = match feed.fetch(&FeedQuery::build(&params, today)).await {
        Ok(features) => features,
        Err(e) => {
            log::warn!("getEarthquakes({call_id}) failed: {e}");
            return finish(
                transcript,
                FEED_FAILURE_MESSAGE.to_string(),
                vec![record],
                Err(e.into()),
            );
        }
    };
    let record = record.with_result(features);

    let tool_results = first_content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, .. } => Some(ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: if *id == call_id {
                    summarize_result(&record)
                } else {
                    SKIPPED_TOOL_MESSAGE.to_string()
                },
            }),
            _ => None,
        })
        .collect();

    let preamble = extract_text(&first_content);
    messages.push(Message::blocks("assistant", first_content));
    messages.push(Message::blocks("user", tool_results));

    match provider
        .chat(&system_prompt, &messages, &tools, ToolChoice::Disabled)
        .await
    {
        Ok(second) => {
            let answer = extract_text(&second.content);
            let answer = if answer.is_empty() { preamble } else { answer };
            finish(transcript, answer, vec![record], Ok(()))
        }
        Err(e) => {
            log::error!("Model call after getEarthquakes failed: {e}");
            finish(transcript, String::new(), vec![record], Err(e))
        }
    }
}

fn finish(
    transcript: Transcript,
    answer: String,
    records: Vec<ToolInvocationRecord>,
    result: Result<(), AiError>,
) -> TurnOutcome {
    TurnOutcome {
        transcript: transcript.with_turn(Turn::assistant(answer.clone(), records)),
        answer,
        result,
    }
}

/// Replays a transcript as provider messages. Past tool calls become tool
/// use / tool result pairs so the model sees what it already fetched.
#[must_use]
pub fn transcript_to_messages(transcript: &Transcript) -> Vec<Message> {
    let mut messages = Vec::new();

    for turn in transcript.turns() {
        match turn {
            Turn::User { text } => messages.push(Message::user(text.clone())),
            Turn::Assistant {
                text,
                tool_invocations,
            } => {
                if !tool_invocations.is_empty() {
                    messages.push(Message::blocks(
                        "assistant",
                        tool_invocations
                            .iter()
                            .map(|r| ContentBlock::ToolUse {
                                id: r.tool_call_id.clone(),
                                name: r.tool_name.clone(),
                                input: serde_json::to_value(r.args).unwrap_or_default(),
                            })
                            .collect(),
                    ));
                    messages.push(Message::blocks(
                        "user",
                        tool_invocations
                            .iter()
                            .map(|r| ContentBlock::ToolResult {
                                tool_use_id: r.tool_call_id.clone(),
                                content: summarize_result(r),
                            })
                            .collect(),
                    ));
                }
                if !text.trim().is_empty() {
                    messages.push(Message::assistant(text.clone()));
                }
            }
        }
    }

    messages
}

/// Gives every tool use block a non-empty ID. Some local servers omit them.
fn assign_missing_ids(content: Vec<ContentBlock>) -> Vec<ContentBlock> {
    content
        .into_iter()
        .map(|block| match block {
            ContentBlock::ToolUse { id, name, input } if id.trim().is_empty() => {
                ContentBlock::ToolUse {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name,
                    input,
                }
            }
            other => other,
        })
        .collect()
}

fn first_earthquake_call(content: &[ContentBlock]) -> Option<(String, serde_json::Value)> {
    content.iter().find_map(|b| match b {
        ContentBlock::ToolUse { id, name, input } if name == GET_EARTHQUAKES => {
            Some((id.clone(), input.clone()))
        }
        _ => None,
    })
}

/// Reads tool arguments leniently: numbers may arrive as strings, and
/// anything unusable is treated as missing.
fn parse_tool_args(input: &serde_json::Value) -> RawQueryArgs {
    let number = |key: &str| match input.get(key)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    RawQueryArgs {
        min_magnitude: number("minMagnitude"),
        days: number("days"),
        region: input
            .get("region")
            .and_then(serde_json::Value::as_str)
            .map(String::from),
    }
}

/// Compact tool result for the model: counts per tier and the strongest
/// events.
fn summarize_result(record: &ToolInvocationRecord) -> String {
    if record.state == InvocationState::Pending {
        return FAILED_TOOL_MESSAGE.to_string();
    }

    let layers = MapLayers::fuse(record.features(), None);
    let tiers: serde_json::Map<String, serde_json::Value> = layers
        .tier_counts()
        .into_iter()
        .map(|(tier, n)| (tier.to_string(), serde_json::json!(n)))
        .collect();

    let mut strongest: Vec<_> = layers.earthquakes.iter().collect();
    strongest.sort_by(|a, b| {
        b.magnitude
            .unwrap_or(f64::MIN)
            .total_cmp(&a.magnitude.unwrap_or(f64::MIN))
    });

    let strongest: Vec<serde_json::Value> = strongest
        .into_iter()
        .take(MAX_LISTED_EVENTS)
        .map(|m| {
            serde_json::json!({
                "mag": m.magnitude,
                "place": m.place,
                "time": m.time.as_ref().map(ToString::to_string),
                "depthKm": m.depth_km,
            })
        })
        .collect();

    let summary = serde_json::json!({
        "query": record.args,
        "count": record.features().len(),
        "tiers": tiers,
        "strongest": strongest,
    });

    truncate_for_model(summary.to_string())
}

fn truncate_for_model(raw: String) -> String {
    if raw.len() <= MAX_TOOL_RESULT_BYTES {
        return raw;
    }

    let mut cut = MAX_TOOL_RESULT_BYTES;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &raw[..cut])
}
