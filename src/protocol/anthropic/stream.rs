use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::event::{ResponseMetadata, ResponseStatus, StopReason, Usage};
use crate::protocol::delta::{ReasoningDelta, StreamDelta};
use crate::protocol::mapping::anthropic_stop_to_reason;
use crate::protocol::tool_args::ToolArgsBuffer;
use crate::protocol::ProviderStreamDecoder;
use crate::stream::SseEvent;
use crate::util::next_id;

use super::{AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent, AnthropicUsage};

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockType {
    Text,
    Thinking { reasoning_id: String },
    ToolUse { initial_input: Option<String> },
    Other,
}

/// Per-content-block state machine (`start` → `delta`* → `stop`).
///
/// Tool input fragments accumulate in a buffer keyed by block index and are
/// parsed only at `content_block_stop`. Thinking blocks become reasoning
/// parts whose `output_index` is the block index.
#[derive(Debug, Default)]
pub struct BlockStreamDecoder {
    block_types: FxHashMap<usize, BlockType>,
    args: ToolArgsBuffer,
    sequence: u64,
    done: bool,
}

impl BlockStreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn set_block(&mut self, index: usize, block: BlockType) {
        if self.block_types.insert(index, block).is_some() {
            tracing::debug!(index, "content_block_start reopened an active block");
        }
    }

    fn reasoning(&mut self, index: usize, reasoning_id: String, text: String, is_complete: bool) -> StreamDelta {
        self.sequence += 1;
        StreamDelta::Reasoning(ReasoningDelta {
            reasoning_id,
            output_index: u32::try_from(index).unwrap_or(u32::MAX),
            summary_index: 0,
            sequence_number: self.sequence,
            text,
            is_complete,
        })
    }

    pub fn decode_event_into(&mut self, event: AnthropicStreamEvent, out: &mut Vec<StreamDelta>) {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                out.push(StreamDelta::Metadata(ResponseMetadata {
                    model: message.model,
                    provider_response_id: message.id,
                    usage: message.usage.as_ref().map(usage_from_wire),
                    ..ResponseMetadata::default()
                }));
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => self.start_block(index, content_block, out),
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
                self.block_delta(index, delta, out);
            }
            AnthropicStreamEvent::ContentBlockStop { index } => self.stop_block(index, out),
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let stop_reason = delta.stop_reason.as_deref().map(anthropic_stop_to_reason);
                let status = stop_reason.map(|reason| {
                    if reason == StopReason::MaxTokens {
                        ResponseStatus::Incomplete
                    } else {
                        ResponseStatus::Completed
                    }
                });
                out.push(StreamDelta::Metadata(ResponseMetadata {
                    status,
                    stop_reason,
                    usage: usage.as_ref().map(usage_from_wire),
                    ..ResponseMetadata::default()
                }));
            }
            AnthropicStreamEvent::MessageStop => {
                self.finish(out);
                self.done = true;
                out.push(StreamDelta::Done);
            }
            AnthropicStreamEvent::Ping => {}
            AnthropicStreamEvent::Error { error } => {
                let status = if error.type_ == "overloaded_error" { 529 } else { 500 };
                out.push(StreamDelta::Error {
                    status,
                    message: error.message,
                });
            }
            AnthropicStreamEvent::Unknown => {
                tracing::debug!("unknown content-block stream event dropped");
            }
        }
    }

    fn start_block(&mut self, index: usize, block: AnthropicContentBlock, out: &mut Vec<StreamDelta>) {
        match block {
            AnthropicContentBlock::Text { text } => {
                self.set_block(index, BlockType::Text);
                if !text.is_empty() {
                    out.push(StreamDelta::Text(text));
                }
            }
            AnthropicContentBlock::Thinking { thinking, .. } => {
                let reasoning_id = next_id("rs");
                self.set_block(
                    index,
                    BlockType::Thinking {
                        reasoning_id: reasoning_id.clone(),
                    },
                );
                let delta = self.reasoning(index, reasoning_id, thinking, false);
                out.push(delta);
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let initial_input = match &input {
                    Value::Object(map) if !map.is_empty() => Some(input.to_string()),
                    _ => None,
                };
                self.set_block(index, BlockType::ToolUse { initial_input });
                self.args.start(index, id.clone());
                out.push(StreamDelta::ToolCallStart {
                    id,
                    name,
                    server_label: None,
                });
            }
            AnthropicContentBlock::RedactedThinking { .. } | AnthropicContentBlock::ToolResult { .. } => {
                self.set_block(index, BlockType::Other);
            }
        }
    }

    fn block_delta(&mut self, index: usize, delta: AnthropicDelta, out: &mut Vec<StreamDelta>) {
        let block = self.block_types.get(&index).cloned();
        match (delta, block) {
            (AnthropicDelta::TextDelta { text }, _) => {
                if !text.is_empty() {
                    out.push(StreamDelta::Text(text));
                }
            }
            (AnthropicDelta::ThinkingDelta { thinking }, Some(BlockType::Thinking { reasoning_id })) => {
                let delta = self.reasoning(index, reasoning_id, thinking, false);
                out.push(delta);
            }
            (AnthropicDelta::InputJsonDelta { partial_json }, _) => {
                if !self.args.push(index, &partial_json) {
                    tracing::debug!(index, "input_json_delta for a block that is not an open tool_use");
                }
            }
            (AnthropicDelta::SignatureDelta { .. }, _) => {}
            (delta, block) => {
                tracing::debug!(index, ?delta, ?block, "content block delta dropped");
            }
        }
    }

    fn stop_block(&mut self, index: usize, out: &mut Vec<StreamDelta>) {
        let block = self.block_types.remove(&index);
        match block {
            Some(BlockType::ToolUse { initial_input }) => {
                let finished = match initial_input {
                    Some(input) => self.args.finish_with(index, &input),
                    None => self.args.finish(index),
                };
                if let Some((id, args)) = finished {
                    out.push(StreamDelta::ToolCallArgs { id, args });
                }
            }
            Some(BlockType::Thinking { reasoning_id }) => {
                let delta = self.reasoning(index, reasoning_id, String::new(), true);
                out.push(delta);
            }
            Some(BlockType::Text | BlockType::Other) => {}
            None => tracing::debug!(index, "content_block_stop for unknown block"),
        }
    }
}

fn usage_from_wire(usage: &AnthropicUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        reasoning_tokens: None,
    }
}

impl ProviderStreamDecoder for BlockStreamDecoder {
    fn decode_frame(&mut self, frame: &SseEvent, out: &mut Vec<StreamDelta>) {
        if self.done {
            return;
        }
        match serde_json::from_str::<AnthropicStreamEvent>(&frame.data) {
            Ok(event) => self.decode_event_into(event, out),
            Err(err) => {
                tracing::warn!(error = %err, event = ?frame.event, "dropping malformed content-block frame");
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<StreamDelta>) {
        for (id, args) in self.args.finish_all() {
            out.push(StreamDelta::ToolCallArgs { id, args });
        }
        self.block_types.clear();
    }
}
