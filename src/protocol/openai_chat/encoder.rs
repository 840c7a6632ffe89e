use serde_json::Value;

use crate::event::{Event, EventLog, Role, Segment};
use crate::protocol::mapping::{role_to_openai, tool_args_to_wire, tool_result_to_text};
use crate::protocol::RequestOptions;

use super::{
    OpenAiChatRequest, OpenAiMessage, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall,
    OpenAiToolCallFunction, OpenAiToolFunction,
};

/// Where the system prompt goes in the encoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemPlacement {
    /// Leading `system` message.
    #[default]
    Message,
    /// Returned separately for formats with a top-level system parameter.
    Separate,
}

/// Encoded message list plus the out-of-band system prompt, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatMessages {
    pub system: Option<String>,
    pub messages: Vec<OpenAiMessage>,
}

/// Encode an Event Log as chat-style messages.
///
/// Only the leading system Event is the system prompt; a later one stays in
/// place as a `system` message. Reasoning segments have no chat
/// representation and are dropped. Every `tool_result` becomes its own
/// `tool` message after the message of the Event that carried it.
#[must_use]
pub fn encode_chat_messages(log: &EventLog, placement: SystemPlacement) -> ChatMessages {
    let mut messages: Vec<OpenAiMessage> = Vec::with_capacity(log.len() + 1);

    for event in log.conversation_events() {
        match event.role {
            Role::System => {
                messages.push(OpenAiMessage::text(
                    role_to_openai(Role::System),
                    event.text_content(),
                ));
            }
            Role::User => {
                if event.tool_results().next().is_none() || !event.text_content().is_empty() {
                    messages.push(OpenAiMessage::text(
                        role_to_openai(Role::User),
                        event.text_content(),
                    ));
                }
                push_tool_messages(event, &mut messages);
            }
            Role::Assistant => {
                messages.push(encode_assistant(event));
                push_tool_messages(event, &mut messages);
            }
            Role::Tool => push_tool_messages(event, &mut messages),
        }
    }

    let system = log.system_prompt().filter(|system| !system.is_empty());
    match placement {
        SystemPlacement::Message => {
            if let Some(system) = system {
                messages.insert(0, OpenAiMessage::text(role_to_openai(Role::System), system));
            }
            ChatMessages {
                system: None,
                messages,
            }
        }
        SystemPlacement::Separate => ChatMessages { system, messages },
    }
}

fn encode_assistant(event: &Event) -> OpenAiMessage {
    let text = event.text_content();
    let tool_calls: Vec<OpenAiToolCall> = event
        .tool_calls()
        .map(|call| OpenAiToolCall {
            id: call.id.clone(),
            type_: "function".to_string(),
            function: OpenAiToolCallFunction {
                name: call.name.clone(),
                arguments: tool_args_to_wire(call),
            },
        })
        .collect();

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(Value::String(text))
    };
    OpenAiMessage {
        role: role_to_openai(Role::Assistant).to_string(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

fn push_tool_messages(event: &Event, messages: &mut Vec<OpenAiMessage>) {
    for segment in &event.segments {
        if let Segment::ToolResult(result) = segment {
            messages.push(OpenAiMessage {
                role: role_to_openai(Role::Tool).to_string(),
                content: Some(Value::String(tool_result_to_text(result))),
                tool_calls: None,
                tool_call_id: Some(result.id.clone()),
            });
        }
    }
}

/// Build the full Chat Completions request body.
#[must_use]
pub fn encode_chat_request(log: &EventLog, options: &RequestOptions) -> OpenAiChatRequest {
    let ChatMessages { messages, .. } = encode_chat_messages(log, SystemPlacement::Message);
    let tools = (!options.tools.is_empty()).then(|| {
        options
            .tools
            .iter()
            .map(|tool| OpenAiTool {
                type_: "function".to_string(),
                function: OpenAiToolFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    });

    OpenAiChatRequest {
        model: options.model.clone(),
        messages,
        tools,
        stream: options.stream.then_some(true),
        stream_options: options
            .stream
            .then_some(OpenAiStreamOptions { include_usage: true }),
        max_tokens: options.max_tokens,
    }
}
