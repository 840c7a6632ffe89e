use crate::event::{Event, EventLog, Role, Segment, ToolCallSegment, ToolResultSegment};
use crate::protocol::mapping::{openai_role_to_role, tool_output_from_text};
use crate::protocol::tool_args::args_from_wire;
use crate::util::{next_id, unix_now_millis};

use super::OpenAiMessage;

/// Rebuild an Event Log from chat-style messages.
///
/// `system` is the out-of-band system prompt for formats that carry it
/// separately. Consecutive `tool` messages fold into one `tool` Event.
#[must_use]
pub fn decode_chat_messages(messages: &[OpenAiMessage], system: Option<&str>) -> EventLog {
    let base_ts = unix_now_millis();
    let mut events: Vec<Event> = Vec::with_capacity(messages.len() + 1);
    let mut previous_was_tool = false;
    let next_event =
        |role: Role, position: usize| Event::with_id(next_id("evt"), role, base_ts + position as u64);

    if let Some(system) = system.filter(|system| !system.is_empty()) {
        let mut event = next_event(Role::System, events.len());
        event.segments.push(Segment::text(system));
        events.push(event);
    }

    for message in messages {
        let role = openai_role_to_role(&message.role);
        if role == Role::Tool {
            let Some(call_id) = message.tool_call_id.clone() else {
                tracing::warn!("tool message without tool_call_id dropped");
                continue;
            };
            let result = Segment::ToolResult(ToolResultSegment {
                id: call_id,
                output: tool_output_from_text(&message.content_text()),
                error: None,
            });
            if previous_was_tool && !events.is_empty() {
                let last = events.len() - 1;
                events[last].segments.push(result);
            } else {
                let mut event = next_event(Role::Tool, events.len());
                event.segments.push(result);
                events.push(event);
            }
            previous_was_tool = true;
            continue;
        }

        previous_was_tool = false;
        let mut event = next_event(role, events.len());
        event.segments = decode_message_segments(message);
        events.push(event);
    }

    EventLog::from_events(events)
}

/// Segments of one non-tool message: text first, then tool calls.
#[must_use]
pub fn decode_message_segments(message: &OpenAiMessage) -> Vec<Segment> {
    let mut segments = Vec::new();
    let text = message.content_text();
    if !text.is_empty() {
        segments.push(Segment::text(text));
    }
    for call in message.tool_calls.iter().flatten() {
        segments.push(Segment::ToolCall(ToolCallSegment::new(
            call.id.clone(),
            call.function.name.clone(),
            args_from_wire(&call.function.arguments),
        )));
    }
    segments
}
