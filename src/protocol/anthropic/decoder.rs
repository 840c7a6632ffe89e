use serde_json::Value;

use crate::event::{
    args_parse_error_marker, Event, EventLog, ReasoningPart, ReasoningSegment, Role, Segment,
    ToolCallSegment, ToolResultSegment,
};
use crate::protocol::mapping::{tool_error_from_text, tool_output_from_text};
use crate::util::{next_id, unix_now_millis};

use super::{AnthropicContentBlock, AnthropicMessage};

/// Rebuild an Event Log from a system prompt and Messages API messages.
///
/// A `user` message is split into runs: `tool_result` blocks become a
/// `tool` Event, other blocks a `user` Event.
#[must_use]
pub fn decode_messages(system: Option<&str>, messages: &[AnthropicMessage]) -> EventLog {
    let base_ts = unix_now_millis();
    let mut events: Vec<Event> = Vec::with_capacity(messages.len() + 1);
    let push = |events: &mut Vec<Event>, role: Role, segments: Vec<Segment>| {
        let mut event = Event::with_id(next_id("evt"), role, base_ts + events.len() as u64);
        event.segments = segments;
        events.push(event);
    };

    if let Some(system) = system.filter(|system| !system.is_empty()) {
        push(&mut events, Role::System, vec![Segment::text(system)]);
    }

    for message in messages {
        let blocks = message.content.clone().into_blocks();
        if message.role == "assistant" {
            push(&mut events, Role::Assistant, assistant_segments(blocks));
            continue;
        }

        let mut run_role: Option<Role> = None;
        let mut run: Vec<Segment> = Vec::new();
        for block in blocks {
            let (role, segment) = match block {
                AnthropicContentBlock::Text { text } => (Role::User, Segment::text(text)),
                AnthropicContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => (Role::Tool, decode_tool_result(tool_use_id, &content, is_error)),
                other => {
                    tracing::debug!(block = ?other, "ignoring non-text block in user message");
                    continue;
                }
            };
            if run_role.is_some_and(|current| current != role) {
                let finished = std::mem::take(&mut run);
                push(&mut events, run_role.unwrap_or(Role::User), strip_empty(finished));
            }
            run_role = Some(role);
            run.push(segment);
        }
        push(&mut events, run_role.unwrap_or(Role::User), strip_empty(run));
    }

    EventLog::from_events(events)
}

fn strip_empty(segments: Vec<Segment>) -> Vec<Segment> {
    segments
        .into_iter()
        .filter(|segment| !matches!(segment, Segment::Text { text } if text.is_empty()))
        .collect()
}

fn assistant_segments(blocks: Vec<AnthropicContentBlock>) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(blocks.len());
    for (position, block) in blocks.into_iter().enumerate() {
        match block {
            AnthropicContentBlock::Text { text } => {
                if !text.is_empty() {
                    segments.push(Segment::text(text));
                }
            }
            AnthropicContentBlock::Thinking { thinking, .. } => {
                let mut reasoning = ReasoningSegment::new(
                    next_id("rs"),
                    u32::try_from(position).unwrap_or(u32::MAX),
                );
                reasoning.streaming = false;
                reasoning.combined_text = (!thinking.is_empty()).then(|| thinking.clone());
                reasoning.parts.push(ReasoningPart {
                    summary_index: 0,
                    text: thinking,
                    is_complete: true,
                    sequence_number: 0,
                });
                segments.push(Segment::Reasoning(reasoning));
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let args = match input {
                    Value::Object(map) => map,
                    Value::Null => serde_json::Map::new(),
                    other => args_parse_error_marker(&other.to_string(), "tool input is not an object"),
                };
                segments.push(Segment::ToolCall(ToolCallSegment::new(id, name, args)));
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => segments.push(decode_tool_result(tool_use_id, &content, is_error)),
            AnthropicContentBlock::RedactedThinking { .. } => {
                tracing::debug!("redacted thinking block skipped");
            }
        }
    }
    segments
}

/// `content` is a string or an array of text blocks.
fn decode_tool_result(tool_use_id: String, content: &Value, is_error: bool) -> Segment {
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let (output, error) = if is_error {
        let (output, error) = tool_error_from_text(&text);
        (output, Some(error))
    } else {
        (tool_output_from_text(&text), None)
    };
    Segment::ToolResult(ToolResultSegment {
        id: tool_use_id,
        output,
        error,
    })
}
