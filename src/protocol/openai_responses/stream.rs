use serde_json::Value;

use crate::event::{ResponseMetadata, ResponseStatus, StopReason, Usage};
use crate::protocol::delta::{ReasoningDelta, StreamDelta};
use crate::protocol::mapping::tool_output_from_text;
use crate::protocol::tool_args::ToolArgsBuffer;
use crate::protocol::ProviderStreamDecoder;
use crate::stream::sse::is_done_event;
use crate::stream::SseEvent;

use super::{ResponseObject, ResponsesItem, ResponsesStreamEvent};

/// Decoder for the typed lifecycle events of a streamed response.
///
/// Call arguments accumulate per `output_index` and are parsed when the
/// arguments (or the whole item) are reported done. Reasoning summary events
/// carry their own `sequence_number`, which is forwarded unchanged.
#[derive(Debug, Default)]
pub struct ResponsesStreamDecoder {
    args: ToolArgsBuffer,
    saw_tool_call: bool,
    done: bool,
}

impl ResponsesStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_event_into(&mut self, event: ResponsesStreamEvent, out: &mut Vec<StreamDelta>) {
        match event {
            ResponsesStreamEvent::Created { response } => {
                out.push(StreamDelta::Metadata(ResponseMetadata {
                    model: response.model,
                    provider_response_id: response.id,
                    ..ResponseMetadata::default()
                }));
            }
            ResponsesStreamEvent::InProgress => {}
            ResponsesStreamEvent::OutputItemAdded { output_index, item } => {
                self.item_added(output_index as usize, item, out);
            }
            ResponsesStreamEvent::OutputItemDone { output_index, item } => {
                self.item_done(output_index as usize, item, out);
            }
            ResponsesStreamEvent::OutputTextDelta { delta } => {
                if !delta.is_empty() {
                    out.push(StreamDelta::Text(delta));
                }
            }
            ResponsesStreamEvent::ReasoningSummaryPartAdded {
                item_id,
                output_index,
                summary_index,
                sequence_number,
            } => out.push(reasoning(item_id, output_index, summary_index, sequence_number, String::new(), false)),
            ResponsesStreamEvent::ReasoningSummaryTextDelta {
                item_id,
                output_index,
                summary_index,
                delta,
                sequence_number,
            } => out.push(reasoning(item_id, output_index, summary_index, sequence_number, delta, false)),
            ResponsesStreamEvent::ReasoningSummaryTextDone { .. } => {}
            ResponsesStreamEvent::ReasoningSummaryPartDone {
                item_id,
                output_index,
                summary_index,
                sequence_number,
            } => out.push(reasoning(item_id, output_index, summary_index, sequence_number, String::new(), true)),
            ResponsesStreamEvent::McpCallArgumentsDelta { output_index, delta }
            | ResponsesStreamEvent::FunctionCallArgumentsDelta { output_index, delta } => {
                if !self.args.push(output_index as usize, &delta) {
                    tracing::debug!(output_index, "arguments delta for an item that is not an open call");
                }
            }
            ResponsesStreamEvent::McpCallArgumentsDone {
                output_index,
                arguments,
            }
            | ResponsesStreamEvent::FunctionCallArgumentsDone {
                output_index,
                arguments,
            } => {
                if let Some((id, args)) = self.args.finish_with(output_index as usize, &arguments) {
                    out.push(StreamDelta::ToolCallArgs { id, args });
                }
            }
            ResponsesStreamEvent::Completed { response } => {
                self.terminal(&response, ResponseStatus::Completed, out);
                self.done = true;
                out.push(StreamDelta::Done);
            }
            ResponsesStreamEvent::Incomplete { response } => {
                self.terminal(&response, ResponseStatus::Incomplete, out);
                self.done = true;
                out.push(StreamDelta::Done);
            }
            ResponsesStreamEvent::Failed { response } => {
                self.terminal(&response, ResponseStatus::Failed, out);
                self.done = true;
                let message = response
                    .error
                    .map(|error| error.message)
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| "response failed".to_string());
                out.push(StreamDelta::Error { status: 500, message });
            }
            ResponsesStreamEvent::Error { code, message } => {
                let status = match code.as_deref() {
                    Some("rate_limit_exceeded") => 429,
                    Some("server_is_overloaded") => 503,
                    _ => 500,
                };
                out.push(StreamDelta::Error { status, message });
            }
            ResponsesStreamEvent::Unknown => {
                tracing::debug!("unknown responses stream event dropped");
            }
        }
    }

    fn item_added(&mut self, index: usize, item: ResponsesItem, out: &mut Vec<StreamDelta>) {
        match item {
            ResponsesItem::McpCall {
                id,
                server_label,
                name,
                ..
            } => {
                self.saw_tool_call = true;
                self.args.start(index, id.clone());
                out.push(StreamDelta::ToolCallStart {
                    id,
                    name,
                    server_label: Some(server_label),
                });
            }
            ResponsesItem::FunctionCall { call_id, name, .. } => {
                self.saw_tool_call = true;
                self.args.start(index, call_id.clone());
                out.push(StreamDelta::ToolCallStart {
                    id: call_id,
                    name,
                    server_label: None,
                });
            }
            _ => {}
        }
    }

    fn item_done(&mut self, index: usize, item: ResponsesItem, out: &mut Vec<StreamDelta>) {
        match item {
            ResponsesItem::McpCall {
                id,
                arguments,
                output,
                error,
                ..
            } => {
                if let Some((id, args)) = self.args.finish_with(index, &arguments) {
                    out.push(StreamDelta::ToolCallArgs { id, args });
                }
                if output.is_some() || error.is_some() {
                    out.push(StreamDelta::ToolResult {
                        id,
                        output: output.as_deref().map_or(Value::Null, tool_output_from_text),
                        error,
                    });
                }
            }
            ResponsesItem::FunctionCall { arguments, .. } => {
                if let Some((id, args)) = self.args.finish_with(index, &arguments) {
                    out.push(StreamDelta::ToolCallArgs { id, args });
                }
            }
            _ => {}
        }
    }

    fn terminal(&mut self, response: &ResponseObject, status: ResponseStatus, out: &mut Vec<StreamDelta>) {
        self.finish(out);
        let reason = response
            .incomplete_details
            .as_ref()
            .and_then(|details| details.reason.as_deref());
        let stop_reason = match (status, reason) {
            (ResponseStatus::Incomplete, Some("content_filter")) => Some(StopReason::ContentFilter),
            (ResponseStatus::Incomplete, _) => Some(StopReason::MaxTokens),
            (ResponseStatus::Failed, _) => None,
            (ResponseStatus::Completed, _) if self.saw_tool_call => Some(StopReason::ToolCalls),
            (ResponseStatus::Completed, _) => Some(StopReason::EndTurn),
        };
        out.push(StreamDelta::Metadata(ResponseMetadata {
            status: Some(status),
            stop_reason,
            model: response.model.clone(),
            provider_response_id: response.id.clone(),
            usage: response.usage.as_ref().map(|usage| Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                reasoning_tokens: usage
                    .output_tokens_details
                    .as_ref()
                    .and_then(|details| details.reasoning_tokens),
            }),
        }));
    }
}

fn reasoning(
    reasoning_id: String,
    output_index: u32,
    summary_index: u32,
    sequence_number: u64,
    text: String,
    is_complete: bool,
) -> StreamDelta {
    StreamDelta::Reasoning(ReasoningDelta {
        reasoning_id,
        output_index,
        summary_index,
        sequence_number,
        text,
        is_complete,
    })
}

impl ProviderStreamDecoder for ResponsesStreamDecoder {
    fn decode_frame(&mut self, frame: &SseEvent, out: &mut Vec<StreamDelta>) {
        if self.done {
            return;
        }
        if is_done_event(frame) {
            self.finish(out);
            self.done = true;
            out.push(StreamDelta::Done);
            return;
        }
        match serde_json::from_str::<ResponsesStreamEvent>(&frame.data) {
            Ok(event) => self.decode_event_into(event, out),
            Err(err) => {
                tracing::warn!(error = %err, event = ?frame.event, "dropping malformed responses frame");
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<StreamDelta>) {
        for (id, args) in self.args.finish_all() {
            out.push(StreamDelta::ToolCallArgs { id, args });
        }
    }
}
