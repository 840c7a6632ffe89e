use crate::event::{ResponseMetadata, ResponseStatus, StopReason, Usage};
use crate::protocol::delta::StreamDelta;
use crate::protocol::mapping::openai_stop_to_reason;
use crate::protocol::tool_args::ToolArgsBuffer;
use crate::protocol::ProviderStreamDecoder;
use crate::stream::sse::is_done_event;
use crate::stream::SseEvent;

use super::{OpenAiErrorFrame, OpenAiStreamChunk, OpenAiUsage};

/// Decoder for `chat.completion.chunk` frames.
///
/// Argument fragments are buffered per tool-call index and parsed when the
/// choice reports a `finish_reason` (or at end of stream).
#[derive(Debug, Default)]
pub struct ChatStreamDecoder {
    args: ToolArgsBuffer,
    saw_header: bool,
    done: bool,
}

impl ChatStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one parsed chunk into canonical deltas.
    pub fn decode_chunk_into(&mut self, chunk: OpenAiStreamChunk, out: &mut Vec<StreamDelta>) {
        if !self.saw_header && (chunk.id.is_some() || chunk.model.is_some()) {
            self.saw_header = true;
            out.push(StreamDelta::Metadata(ResponseMetadata {
                model: chunk.model.clone(),
                provider_response_id: chunk.id.clone(),
                ..ResponseMetadata::default()
            }));
        }

        for choice in chunk.choices {
            if choice.index != 0 {
                tracing::debug!(choice = choice.index, "ignoring non-primary choice");
                continue;
            }
            let delta = choice.delta;
            if let Some(content) = delta.content.filter(|content| !content.is_empty()) {
                out.push(StreamDelta::Text(content));
            }
            if let Some(refusal) = delta.refusal.filter(|refusal| !refusal.is_empty()) {
                out.push(StreamDelta::Text(refusal));
            }

            for call in delta.tool_calls.into_iter().flatten() {
                let index = call.index as usize;
                let (name, arguments) = match call.function {
                    Some(function) => (function.name, function.arguments),
                    None => (None, None),
                };
                if let Some(id) = call.id {
                    if self.args.id_at(index).is_some_and(|open| open != id) {
                        self.finish_index(index, out);
                    }
                    if self.args.id_at(index).is_none() {
                        self.args.start(index, id.clone());
                        out.push(StreamDelta::ToolCallStart {
                            id,
                            name: name.unwrap_or_default(),
                            server_label: None,
                        });
                    }
                }
                if let Some(fragment) = arguments.filter(|fragment| !fragment.is_empty()) {
                    if !self.args.push(index, &fragment) {
                        tracing::debug!(index, "argument fragment for unknown tool-call index dropped");
                    }
                }
            }

            if let Some(finish_reason) = choice.finish_reason {
                self.finish_all(out);
                let stop_reason = openai_stop_to_reason(&finish_reason);
                let status = if stop_reason == StopReason::MaxTokens {
                    ResponseStatus::Incomplete
                } else {
                    ResponseStatus::Completed
                };
                out.push(StreamDelta::Metadata(ResponseMetadata {
                    status: Some(status),
                    stop_reason: Some(stop_reason),
                    ..ResponseMetadata::default()
                }));
            }
        }

        if let Some(usage) = chunk.usage {
            out.push(StreamDelta::Metadata(ResponseMetadata {
                usage: Some(usage_from_wire(&usage)),
                ..ResponseMetadata::default()
            }));
        }
    }

    fn finish_index(&mut self, index: usize, out: &mut Vec<StreamDelta>) {
        if let Some((id, args)) = self.args.finish(index) {
            out.push(StreamDelta::ToolCallArgs { id, args });
        }
    }

    fn finish_all(&mut self, out: &mut Vec<StreamDelta>) {
        for (id, args) in self.args.finish_all() {
            out.push(StreamDelta::ToolCallArgs { id, args });
        }
    }
}

fn usage_from_wire(usage: &OpenAiUsage) -> Usage {
    Usage {
        input_tokens: Some(usage.prompt_tokens),
        output_tokens: Some(usage.completion_tokens),
        reasoning_tokens: usage
            .completion_tokens_details
            .as_ref()
            .and_then(|details| details.reasoning_tokens),
    }
}

impl ProviderStreamDecoder for ChatStreamDecoder {
    fn decode_frame(&mut self, frame: &SseEvent, out: &mut Vec<StreamDelta>) {
        if self.done {
            return;
        }
        if is_done_event(frame) {
            self.finish_all(out);
            self.done = true;
            out.push(StreamDelta::Done);
            return;
        }
        if let Ok(error) = serde_json::from_str::<OpenAiErrorFrame>(&frame.data) {
            out.push(StreamDelta::Error {
                status: 500,
                message: error.error.message,
            });
            return;
        }
        match serde_json::from_str::<OpenAiStreamChunk>(&frame.data) {
            Ok(chunk) => self.decode_chunk_into(chunk, out),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed chat stream frame");
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<StreamDelta>) {
        self.finish_all(out);
    }
}
