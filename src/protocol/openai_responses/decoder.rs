use serde_json::Value;

use crate::event::{
    Event, EventLog, ReasoningPart, ReasoningSegment, Role, Segment, ToolCallSegment,
    ToolResultSegment,
};
use crate::protocol::mapping::{openai_role_to_role, tool_output_from_text};
use crate::protocol::tool_args::args_from_wire;
use crate::util::{next_id, unix_now_millis};

use super::{ResponsesItem, SummaryPart};

/// Assistant items collected until the turn closes.
#[derive(Default)]
struct AssistantGroup {
    segments: Vec<Segment>,
    results: Vec<Segment>,
}

impl AssistantGroup {
    fn has_results(&self) -> bool {
        !self.results.is_empty()
    }
}

struct LogWriter {
    base_ts: u64,
    events: Vec<Event>,
    group: Option<AssistantGroup>,
}

impl LogWriter {
    fn push(&mut self, role: Role, segments: Vec<Segment>) {
        let ts = self.base_ts + self.events.len() as u64;
        let mut event = Event::with_id(next_id("evt"), role, ts);
        event.segments = segments;
        self.events.push(event);
    }

    fn group(&mut self) -> &mut AssistantGroup {
        self.group.get_or_insert_with(AssistantGroup::default)
    }

    fn close_group(&mut self) {
        if let Some(group) = self.group.take() {
            self.push(Role::Assistant, group.segments);
            if !group.results.is_empty() {
                self.push(Role::Tool, group.results);
            }
        }
    }

    /// An assistant item that is not a remote call ends a turn whose
    /// remote calls already carry results.
    fn close_if_resolved(&mut self) {
        if self.group.as_ref().is_some_and(AssistantGroup::has_results) {
            self.close_group();
        }
    }
}

/// Rebuild an Event Log from Responses API input items.
///
/// Assistant messages, reasoning items and calls form one assistant Event.
/// Results folded into `mcp_call` items follow it as a `tool` Event;
/// consecutive `function_call_output` items merge into one `tool` Event.
#[must_use]
pub fn decode_responses_items(items: &[ResponsesItem]) -> EventLog {
    let mut writer = LogWriter {
        base_ts: unix_now_millis(),
        events: Vec::with_capacity(items.len()),
        group: None,
    };

    for (position, item) in items.iter().enumerate() {
        match item {
            ResponsesItem::Message { role, content, .. } if role == "assistant" => {
                writer.close_if_resolved();
                let text: String = content.iter().map(|part| part.text()).collect();
                let group = writer.group();
                if !text.is_empty() {
                    match group.segments.last_mut() {
                        Some(Segment::Text { text: last }) => last.push_str(&text),
                        _ => group.segments.push(Segment::text(text)),
                    }
                }
            }
            ResponsesItem::Message { role, content, .. } => {
                writer.close_group();
                let text: String = content.iter().map(|part| part.text()).collect();
                let segments = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![Segment::text(text)]
                };
                writer.push(openai_role_to_role(role), segments);
            }
            ResponsesItem::Reasoning { id, summary } => {
                writer.close_if_resolved();
                let reasoning = decode_reasoning(id, summary, position);
                writer.group().segments.push(Segment::Reasoning(reasoning));
            }
            ResponsesItem::McpCall {
                id,
                server_label,
                name,
                arguments,
                output,
                error,
            } => {
                let mut call = ToolCallSegment::new(id.clone(), name.clone(), args_from_wire(arguments));
                call.server_label = Some(server_label.clone());
                let group = writer.group();
                group.segments.push(Segment::ToolCall(call));
                if output.is_some() || error.is_some() {
                    group.results.push(Segment::ToolResult(ToolResultSegment {
                        id: id.clone(),
                        output: output.as_deref().map_or(Value::Null, tool_output_from_text),
                        error: error.clone(),
                    }));
                }
            }
            ResponsesItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => {
                writer.close_if_resolved();
                let call = ToolCallSegment::new(call_id.clone(), name.clone(), args_from_wire(arguments));
                writer.group().segments.push(Segment::ToolCall(call));
            }
            ResponsesItem::FunctionCallOutput { call_id, output } => {
                writer.close_group();
                let result = Segment::ToolResult(ToolResultSegment {
                    id: call_id.clone(),
                    output: tool_output_from_text(output),
                    error: None,
                });
                match writer.events.last_mut() {
                    Some(last) if last.role == Role::Tool => last.segments.push(result),
                    _ => writer.push(Role::Tool, vec![result]),
                }
            }
            ResponsesItem::Unknown => {
                tracing::debug!(position, "skipping unknown responses item");
            }
        }
    }
    writer.close_group();

    EventLog::from_events(writer.events)
}

fn decode_reasoning(id: &str, summary: &[SummaryPart], position: usize) -> ReasoningSegment {
    let mut reasoning = ReasoningSegment::new(id, u32::try_from(position).unwrap_or(u32::MAX));
    reasoning.streaming = false;
    reasoning.parts = summary
        .iter()
        .enumerate()
        .map(|(index, part)| ReasoningPart {
            summary_index: u32::try_from(index).unwrap_or(u32::MAX),
            text: part.text().to_string(),
            is_complete: true,
            sequence_number: 0,
        })
        .collect();
    let joined = reasoning.joined_text();
    reasoning.combined_text = (!joined.is_empty()).then_some(joined);
    reasoning
}
