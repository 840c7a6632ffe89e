use serde_json::Value;

use crate::event::{Event, EventLog, Role, Segment};
use crate::protocol::mapping::{role_to_anthropic, tool_result_to_text};
use crate::protocol::RequestOptions;

use super::{AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicTool};

const DEFAULT_MAX_TOKENS: u64 = 4096;

/// System prompt (always out-of-band) plus one message per Event.
///
/// Only the leading system Event is the system prompt. The Messages API has
/// no system role inside `messages`, so a later system Event is replayed in
/// place as `user` text. Tool results travel as `tool_result` blocks in
/// `user` messages. Reasoning is not replayed since the stored segments
/// carry no signature.
#[must_use]
pub fn encode_messages(log: &EventLog) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut messages = Vec::with_capacity(log.len());

    for event in log.conversation_events() {
        match event.role {
            Role::System => {
                tracing::debug!(event_id = %event.id, "mid-log system event sent as user text");
                messages.push(message(
                    Role::User,
                    vec![AnthropicContentBlock::Text {
                        text: event.text_content(),
                    }],
                ));
            }
            Role::User | Role::Tool => {
                let mut blocks = text_blocks(event);
                blocks.extend(result_blocks(event));
                if blocks.is_empty() {
                    blocks.push(AnthropicContentBlock::Text {
                        text: String::new(),
                    });
                }
                messages.push(message(event.role, blocks));
            }
            Role::Assistant => {
                let blocks = event
                    .segments
                    .iter()
                    .filter_map(|segment| match segment {
                        Segment::Text { text } if !text.is_empty() => {
                            Some(AnthropicContentBlock::Text { text: text.clone() })
                        }
                        Segment::ToolCall(call) => Some(AnthropicContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: Value::Object(call.args.clone()),
                        }),
                        _ => None,
                    })
                    .collect();
                messages.push(message(Role::Assistant, blocks));

                let results = result_blocks(event);
                if !results.is_empty() {
                    messages.push(message(Role::Tool, results));
                }
            }
        }
    }

    let system = log.system_prompt().filter(|system| !system.is_empty());
    (system, messages)
}

fn message(role: Role, blocks: Vec<AnthropicContentBlock>) -> AnthropicMessage {
    AnthropicMessage {
        role: role_to_anthropic(role).to_string(),
        content: AnthropicContent::Blocks(blocks),
    }
}

fn text_blocks(event: &Event) -> Vec<AnthropicContentBlock> {
    event
        .segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Text { text } if !text.is_empty() => {
                Some(AnthropicContentBlock::Text { text: text.clone() })
            }
            _ => None,
        })
        .collect()
}

fn result_blocks(event: &Event) -> Vec<AnthropicContentBlock> {
    event
        .tool_results()
        .map(|result| AnthropicContentBlock::ToolResult {
            tool_use_id: result.id.clone(),
            content: Value::String(tool_result_to_text(result)),
            is_error: result.error.is_some(),
        })
        .collect()
}

/// Build the full Messages API request body.
#[must_use]
pub fn encode_messages_request(log: &EventLog, options: &RequestOptions) -> AnthropicRequest {
    let (system, messages) = encode_messages(log);
    let tools = (!options.tools.is_empty()).then(|| {
        options
            .tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect()
    });
    AnthropicRequest {
        model: options.model.clone(),
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system,
        tools,
        stream: options.stream.then_some(true),
    }
}
