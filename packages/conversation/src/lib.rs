#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Conversation transcript and tool invocation records.
//!
//! The transcript is an ordered, append-only sequence of turns owned by
//! the caller. Nothing here mutates it in place: appending returns a new
//! [`Transcript`]. Each assistant turn carries the tool invocations it made,
//! and the most recent completed `getEarthquakes` invocation decides both
//! which earthquakes are on the map and which region the risk overlay is
//! fetched for.

use std::fmt::Write as _;

use quake_map_quake_models::{DEFAULT_RISK_REGION, QueryParameters, Region};
use serde::{Deserialize, Serialize};

/// Name of the earthquake query tool.
pub const GET_EARTHQUAKES: &str = "getEarthquakes";

/// Maximum characters of assistant text shown per turn by
/// [`format_transcript`].
const MAX_DISPLAY_TEXT: usize = 2000;

/// Lifecycle of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationState {
    /// Requested but no result recorded. Failed calls stay here.
    Pending,
    /// Completed with a result.
    Result,
}

/// One tool call made by the assistant, as recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationRecord {
    /// Provider-assigned tool call ID.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Current state.
    pub state: InvocationState,
    /// Validated arguments the tool ran with.
    pub args: QueryParameters,
    /// Feed features, present once `state` is `result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<serde_json::Value>>,
}

impl ToolInvocationRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: QueryParameters,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            state: InvocationState::Pending,
            args,
            result: None,
        }
    }

    /// Completes the record with the tool's features.
    #[must_use]
    pub fn with_result(self, features: Vec<serde_json::Value>) -> Self {
        Self {
            state: InvocationState::Result,
            result: Some(features),
            ..self
        }
    }

    /// Whether this is a completed `getEarthquakes` call.
    #[must_use]
    pub fn is_completed_earthquake_query(&self) -> bool {
        self.state == InvocationState::Result && self.tool_name == GET_EARTHQUAKES
    }

    /// The recorded features, or an empty slice while pending.
    #[must_use]
    pub fn features(&self) -> &[serde_json::Value] {
        self.result.as_deref().unwrap_or_default()
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Turn {
    /// A user message.
    User {
        /// Message text.
        text: String,
    },
    /// An assistant reply and the tool calls made while producing it.
    Assistant {
        /// Reply text.
        #[serde(default)]
        text: String,
        /// Tool calls in the order they were made.
        #[serde(default, rename = "toolInvocations")]
        tool_invocations: Vec<ToolInvocationRecord>,
    },
}

impl Turn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>, tool_invocations: Vec<ToolInvocationRecord>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_invocations,
        }
    }

    /// Tool calls made during this turn (always empty for user turns).
    #[must_use]
    pub fn tool_invocations(&self) -> &[ToolInvocationRecord] {
        match self {
            Self::User { .. } => &[],
            Self::Assistant {
                tool_invocations, ..
            } => tool_invocations,
        }
    }

    /// The turn's text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::User { text } | Self::Assistant { text, .. } => text,
        }
    }
}

/// An ordered conversation transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Returns a transcript with `turn` appended.
    #[must_use]
    pub fn with_turn(mut self, turn: Turn) -> Self {
        self.turns.push(turn);
        self
    }

    /// Turns in chronological order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript has no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Every tool invocation in transcript order.
    pub fn invocations(&self) -> impl DoubleEndedIterator<Item = &ToolInvocationRecord> {
        self.turns.iter().flat_map(|t| t.tool_invocations().iter())
    }

    /// The most recent completed `getEarthquakes` invocation.
    ///
    /// Scans backwards in transcript order; within a turn the later call
    /// wins.
    #[must_use]
    pub fn latest_earthquake_invocation(&self) -> Option<&ToolInvocationRecord> {
        self.invocations()
            .rev()
            .find(|r| r.is_completed_earthquake_query())
    }

    /// Region argument of the most recent completed `getEarthquakes` call.
    ///
    /// `None` when no call has completed yet, or when the latest call ran
    /// without a region. Earlier calls are never consulted once a later one
    /// exists.
    #[must_use]
    pub fn latest_region(&self) -> Option<Region> {
        self.latest_earthquake_invocation()
            .and_then(|r| r.args.region)
    }

    /// Region to request the risk overlay for: [`Self::latest_region`], or
    /// the default region.
    #[must_use]
    pub fn risk_region(&self) -> Region {
        self.latest_region().unwrap_or(DEFAULT_RISK_REGION)
    }
}

/// Renders a transcript for terminal display.
#[must_use]
pub fn format_transcript(transcript: &Transcript) -> String {
    let mut output = String::new();

    for turn in transcript.turns() {
        match turn {
            Turn::User { text } => {
                let _ = writeln!(output, "--- USER ---\n{text}\n");
            }
            Turn::Assistant {
                text,
                tool_invocations,
            } => {
                let _ = writeln!(output, "--- ASSISTANT ---");
                for record in tool_invocations {
                    let region = record
                        .args
                        .region
                        .map_or_else(|| "global".to_string(), |r| r.to_string());
                    let _ = writeln!(
                        output,
                        "[TOOL CALL: {} M{}+ last {} days, {region}] {}",
                        record.tool_name,
                        record.args.min_magnitude,
                        record.args.days,
                        match record.state {
                            InvocationState::Pending => "no result".to_string(),
                            InvocationState::Result =>
                                format!("{} features", record.features().len()),
                        }
                    );
                }
                if text.chars().count() > MAX_DISPLAY_TEXT {
                    let cut: String = text.chars().take(MAX_DISPLAY_TEXT).collect();
                    let _ = writeln!(output, "{cut}...\n");
                } else {
                    let _ = writeln!(output, "{text}\n");
                }
            }
        }
    }

    output
}
