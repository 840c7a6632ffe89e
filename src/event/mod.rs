pub mod log;

pub use log::EventLog;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::{next_id, unix_now_millis};

/// Key of the parse-error marker stored in `tool_call.args` when the raw
/// argument buffer could not be parsed.
pub const ARGS_PARSE_ERROR_KEY: &str = "__parse_error";
/// Key holding the unparsed raw buffer inside the parse-error marker.
pub const ARGS_RAW_KEY: &str = "__raw";

/// JSON object used for tool-call arguments.
pub type ToolArgsObject = Map<String, Value>;

/// Speaker of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolCalls,
    MaxTokens,
    ContentFilter,
}

/// Provider-reported completion state of an assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Incomplete,
    Failed,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl Usage {
    /// Overlay the fields present in `other`.
    pub fn merge(&mut self, other: &Usage) {
        if other.input_tokens.is_some() {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens.is_some() {
            self.output_tokens = other.output_tokens;
        }
        if other.reasoning_tokens.is_some() {
            self.reasoning_tokens = other.reasoning_tokens;
        }
    }
}

/// Completion metadata attached to assistant Events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ResponseMetadata {
    /// Overlay the fields present in `other`; usage merges field by field.
    pub fn merge(&mut self, other: ResponseMetadata) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.stop_reason.is_some() {
            self.stop_reason = other.stop_reason;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.provider_response_id.is_some() {
            self.provider_response_id = other.provider_response_id;
        }
        if let Some(usage) = other.usage {
            self.usage.get_or_insert_with(Usage::default).merge(&usage);
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSegment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: ToolArgsObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl ToolCallSegment {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: ToolArgsObject) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            server_label: None,
            display_name: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns the parse-error message when `args` holds the error marker.
    #[must_use]
    pub fn args_parse_error(&self) -> Option<&str> {
        self.args.get(ARGS_PARSE_ERROR_KEY).and_then(Value::as_str)
    }

    /// Raw argument buffer preserved by the parse-error marker.
    #[must_use]
    pub fn raw_args(&self) -> Option<&str> {
        self.args.get(ARGS_RAW_KEY).and_then(Value::as_str)
    }
}

/// Build the explicit marker stored in place of arguments that failed to parse.
#[must_use]
pub fn args_parse_error_marker(raw: &str, message: &str) -> ToolArgsObject {
    let mut marker = Map::with_capacity(2);
    marker.insert(
        ARGS_PARSE_ERROR_KEY.to_string(),
        Value::String(message.to_string()),
    );
    marker.insert(ARGS_RAW_KEY.to_string(), Value::String(raw.to_string()));
    marker
}

/// Output of an executed tool call, joined to the call by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultSegment {
    pub id: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One summary part of a reasoning segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningPart {
    pub summary_index: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSegment {
    pub id: String,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub sequence_number: u64,
    #[serde(default)]
    pub parts: Vec<ReasoningPart>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl ReasoningSegment {
    #[must_use]
    pub fn new(id: impl Into<String>, output_index: u32) -> Self {
        Self {
            id: id.into(),
            output_index,
            sequence_number: 0,
            parts: Vec::new(),
            streaming: true,
            combined_text: None,
            effort_level: None,
            reasoning_tokens: None,
        }
    }

    /// Text of all parts in summary order, separated by a blank line.
    #[must_use]
    pub fn joined_text(&self) -> String {
        let mut out = String::new();
        for part in self.parts.iter().filter(|part| !part.text.is_empty()) {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&part.text);
        }
        out
    }
}

/// One typed piece of content inside an Event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    ToolCall(ToolCallSegment),
    ToolResult(ToolResultSegment),
    Reasoning(ReasoningSegment),
}

impl Segment {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    #[must_use]
    pub fn is_reasoning(&self) -> bool {
        matches!(self, Segment::Reasoning(_))
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub ts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_metadata: Option<ResponseMetadata>,
}

impl Event {
    /// Create an empty Event with a fresh client-side id.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self::with_id(next_id("evt"), role, unix_now_millis())
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, role: Role, ts: u64) -> Self {
        Self {
            id: id.into(),
            role,
            segments: Vec::new(),
            ts,
            response_metadata: None,
        }
    }

    /// Convenience constructor for a single-text Event.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        let mut event = Self::new(role);
        event.segments.push(Segment::text(text));
        event
    }

    /// Concatenation of every text segment in order.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            if let Segment::Text { text } = segment {
                out.push_str(text);
            }
        }
        out
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn reasoning(&self) -> impl Iterator<Item = &ReasoningSegment> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Reasoning(reasoning) => Some(reasoning),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_wire_shape() {
        let segment = Segment::ToolCall(ToolCallSegment::new(
            "call_1",
            "get_weather",
            json!({"city": "SF"}).as_object().cloned().unwrap(),
        ));
        let value = serde_json::to_value(&segment).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["id"], "call_1");
        assert_eq!(value["args"]["city"], "SF");
        assert!(value.get("server_label").is_none());

        let back: Segment = serde_json::from_value(value).unwrap();
        assert_eq!(back, segment);
    }

    #[test]
    fn test_text_content_concatenates_in_order() {
        let mut event = Event::new(Role::Assistant);
        event.segments.push(Segment::text("Let me "));
        event.segments.push(Segment::ToolCall(ToolCallSegment::new(
            "c",
            "noop",
            Map::new(),
        )));
        event.segments.push(Segment::text("check."));
        assert_eq!(event.text_content(), "Let me check.");
        assert_eq!(event.tool_calls().count(), 1);
    }

    #[test]
    fn test_parse_error_marker_is_detectable() {
        let call = ToolCallSegment::new(
            "c",
            "f",
            args_parse_error_marker("{\"a\":", "EOF while parsing"),
        );
        assert_eq!(call.args_parse_error(), Some("EOF while parsing"));
        assert_eq!(call.raw_args(), Some("{\"a\":"));

        let clean = ToolCallSegment::new("c", "f", Map::new());
        assert!(clean.args_parse_error().is_none());
    }

    #[test]
    fn test_metadata_merge_keeps_existing_fields() {
        let mut meta = ResponseMetadata {
            model: Some("m".into()),
            usage: Some(Usage {
                input_tokens: Some(10),
                ..Usage::default()
            }),
            ..ResponseMetadata::default()
        };
        meta.merge(ResponseMetadata {
            stop_reason: Some(StopReason::ToolCalls),
            usage: Some(Usage {
                output_tokens: Some(5),
                ..Usage::default()
            }),
            ..ResponseMetadata::default()
        });
        assert_eq!(meta.model.as_deref(), Some("m"));
        assert_eq!(meta.stop_reason, Some(StopReason::ToolCalls));
        let usage = meta.usage.unwrap();
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(5));
    }

    #[test]
    fn test_reasoning_joined_text_skips_empty_parts() {
        let mut reasoning = ReasoningSegment::new("rs_1", 0);
        reasoning.parts.push(ReasoningPart {
            summary_index: 0,
            text: "first".into(),
            is_complete: true,
            sequence_number: 1,
        });
        reasoning.parts.push(ReasoningPart {
            summary_index: 1,
            text: String::new(),
            is_complete: false,
            sequence_number: 2,
        });
        reasoning.parts.push(ReasoningPart {
            summary_index: 2,
            text: "third".into(),
            is_complete: false,
            sequence_number: 3,
        });
        assert_eq!(reasoning.joined_text(), "first\n\nthird");
    }
}
