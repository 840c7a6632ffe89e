pub mod anthropic;
pub mod delta;
pub mod mapping;
pub mod openai_chat;
pub mod openai_responses;
pub mod tool_args;

pub use delta::{ReasoningDelta, StreamDelta, ToolArgs};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TurnError;
use crate::event::EventLog;
use crate::stream::SseEvent;

/// Wire protocol spoken by a model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Chat-completions style: messages with tool-call descriptors.
    #[serde(rename = "openai_chat")]
    OpenAiChat,
    /// Content-block streaming: block start/delta/stop keyed by index.
    #[serde(rename = "anthropic")]
    Anthropic,
    /// Reasoning-capable responses API: typed input/output items.
    #[serde(rename = "openai_responses")]
    OpenAiResponses,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAiChat => "openai_chat",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAiResponses => "openai_responses",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai_chat" | "openai" | "chat" => Ok(ProviderKind::OpenAiChat),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai_responses" | "responses" => Ok(ProviderKind::OpenAiResponses),
            other => Err(format!("unknown provider kind: {other}")),
        }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub parameters: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// A remote tool server reachable by the responses API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServer {
    pub label: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_approval: Option<String>,
}

/// Per-request settings shared by every encoder.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub model: String,
    pub max_tokens: Option<u64>,
    pub tools: Vec<ToolDefinition>,
    pub remote_servers: Vec<RemoteServer>,
    pub reasoning_effort: Option<String>,
    pub stream: bool,
}

impl RequestOptions {
    /// Label of the first configured remote server.
    #[must_use]
    pub fn default_server_label(&self) -> Option<&str> {
        self.remote_servers.first().map(|server| server.label.as_str())
    }
}

/// Encode an Event Log as the JSON request body for `kind`.
///
/// # Errors
///
/// Returns [`TurnError::Translation`] if the request cannot be serialized.
pub fn encode_request(
    kind: ProviderKind,
    log: &EventLog,
    options: &RequestOptions,
) -> Result<Value, TurnError> {
    let body = match kind {
        ProviderKind::OpenAiChat => {
            serde_json::to_value(openai_chat::encoder::encode_chat_request(log, options))
        }
        ProviderKind::Anthropic => {
            serde_json::to_value(anthropic::encoder::encode_messages_request(log, options))
        }
        ProviderKind::OpenAiResponses => serde_json::to_value(
            openai_responses::encoder::encode_responses_request(log, options),
        ),
    };
    body.map_err(|err| TurnError::Translation(format!("{kind} request: {err}")))
}

/// Stateful decoder from one provider's SSE frames to canonical deltas.
///
/// Malformed frames are dropped with a diagnostic; they never abort the stream.
pub trait ProviderStreamDecoder: Send {
    fn decode_frame(&mut self, frame: &SseEvent, out: &mut Vec<StreamDelta>);

    /// Flush buffered state at end of stream (open argument buffers etc).
    fn finish(&mut self, out: &mut Vec<StreamDelta>);
}

#[must_use]
pub fn stream_decoder(kind: ProviderKind) -> Box<dyn ProviderStreamDecoder> {
    match kind {
        ProviderKind::OpenAiChat => Box::new(openai_chat::stream::ChatStreamDecoder::new()),
        ProviderKind::Anthropic => Box::new(anthropic::stream::BlockStreamDecoder::new()),
        ProviderKind::OpenAiResponses => {
            Box::new(openai_responses::stream::ResponsesStreamDecoder::new())
        }
    }
}
