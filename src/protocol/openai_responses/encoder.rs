use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};

use crate::event::{Event, EventLog, ReasoningSegment, Role, Segment, ToolCallSegment, ToolResultSegment};
use crate::protocol::mapping::{tool_args_to_wire, tool_output_to_text, tool_result_to_text};
use crate::protocol::RequestOptions;

use super::{ReasoningOptions, ResponsesContent, ResponsesItem, ResponsesRequest, SummaryPart};

/// Encode an Event Log as Responses API input items.
///
/// Tool calls become `mcp_call` items labelled with the segment's
/// `server_label` or `default_label`; the matching result is folded into
/// the same item. Without any label they fall back to `function_call` plus
/// `function_call_output`.
#[must_use]
pub fn encode_responses_input(log: &EventLog, default_label: Option<&str>) -> Vec<ResponsesItem> {
    let results: FxHashMap<&str, &ToolResultSegment> = log
        .iter()
        .flat_map(Event::tool_results)
        .map(|result| (result.id.as_str(), result))
        .collect();
    let folded: FxHashSet<&str> = log
        .iter()
        .flat_map(Event::tool_calls)
        .filter(|call| call.server_label.is_some() || default_label.is_some())
        .map(|call| call.id.as_str())
        .collect();

    let mut items = Vec::with_capacity(log.len() * 2);
    for event in log {
        match event.role {
            Role::System | Role::User => {
                let text = event.text_content();
                if !text.is_empty() || event.tool_results().next().is_none() {
                    let id = format!("msg_{}", items.len());
                    items.push(message(id, event.role, text));
                }
                push_outputs(event, &folded, &mut items);
            }
            Role::Assistant => {
                encode_assistant(event, &results, default_label, &mut items);
                push_outputs(event, &folded, &mut items);
            }
            Role::Tool => push_outputs(event, &folded, &mut items),
        }
    }
    items
}

fn message(id: String, role: Role, text: String) -> ResponsesItem {
    let (role, content) = match role {
        Role::Assistant => ("assistant", ResponsesContent::OutputText { text }),
        Role::System => ("system", ResponsesContent::InputText { text }),
        Role::User | Role::Tool => ("user", ResponsesContent::InputText { text }),
    };
    ResponsesItem::Message {
        id: Some(id),
        role: role.to_string(),
        content: vec![content],
    }
}

fn encode_assistant(
    event: &Event,
    results: &FxHashMap<&str, &ToolResultSegment>,
    default_label: Option<&str>,
    items: &mut Vec<ResponsesItem>,
) {
    let mut pending_text = String::new();
    let flush = |pending_text: &mut String, items: &mut Vec<ResponsesItem>| {
        if !pending_text.is_empty() {
            let id = format!("msg_{}", items.len());
            items.push(message(id, Role::Assistant, std::mem::take(pending_text)));
        }
    };

    for segment in &event.segments {
        match segment {
            Segment::Text { text } => pending_text.push_str(text),
            Segment::Reasoning(reasoning) => {
                flush(&mut pending_text, items);
                items.push(reasoning_item(reasoning));
            }
            Segment::ToolCall(call) => {
                flush(&mut pending_text, items);
                items.push(call_item(call, results.get(call.id.as_str()).copied(), default_label));
            }
            Segment::ToolResult(_) => {}
        }
    }
    flush(&mut pending_text, items);

    if event.segments.is_empty() {
        let id = format!("msg_{}", items.len());
        items.push(message(id, Role::Assistant, String::new()));
    }
}

fn reasoning_item(reasoning: &ReasoningSegment) -> ResponsesItem {
    ResponsesItem::Reasoning {
        id: reasoning.id.clone(),
        summary: reasoning
            .parts
            .iter()
            .map(|part| SummaryPart::SummaryText {
                text: part.text.clone(),
            })
            .collect(),
    }
}

fn call_item(
    call: &ToolCallSegment,
    result: Option<&ToolResultSegment>,
    default_label: Option<&str>,
) -> ResponsesItem {
    let arguments = tool_args_to_wire(call);
    match call.server_label.as_deref().or(default_label) {
        Some(label) => ResponsesItem::McpCall {
            id: call.id.clone(),
            server_label: label.to_string(),
            name: call.name.clone(),
            arguments,
            output: result
                .filter(|result| result.error.is_none() || !result.output.is_null())
                .map(|result| tool_output_to_text(&result.output)),
            error: result.and_then(|result| result.error.clone()),
        },
        None => ResponsesItem::FunctionCall {
            id: None,
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        },
    }
}

fn push_outputs(event: &Event, folded: &FxHashSet<&str>, items: &mut Vec<ResponsesItem>) {
    for result in event.tool_results() {
        if folded.contains(result.id.as_str()) {
            continue;
        }
        items.push(ResponsesItem::FunctionCallOutput {
            call_id: result.id.clone(),
            output: tool_result_to_text(result),
        });
    }
}

/// Build the full Responses API request body.
#[must_use]
pub fn encode_responses_request(log: &EventLog, options: &RequestOptions) -> ResponsesRequest {
    let input = encode_responses_input(log, options.default_server_label());
    let mut tools: Vec<Value> = options
        .tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect();
    tools.extend(options.remote_servers.iter().map(|server| {
        json!({
            "type": "mcp",
            "server_label": server.label,
            "server_url": server.url,
            "require_approval": server.require_approval.as_deref().unwrap_or("never"),
        })
    }));

    ResponsesRequest {
        model: options.model.clone(),
        input,
        tools: (!tools.is_empty()).then_some(tools),
        stream: options.stream.then_some(true),
        max_output_tokens: options.max_tokens,
        reasoning: options.reasoning_effort.as_ref().map(|effort| ReasoningOptions {
            effort: effort.clone(),
            summary: "detailed".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ReasoningPart;
    use crate::protocol::RemoteServer;

    fn log() -> EventLog {
        let mut reasoning = ReasoningSegment::new("rs_1", 0);
        reasoning.parts.push(ReasoningPart {
            summary_index: 0,
            text: "Plan".into(),
            is_complete: true,
            sequence_number: 1,
        });
        let mut assistant = Event::new(Role::Assistant);
        assistant.segments.push(Segment::Reasoning(reasoning));
        assistant.segments.push(Segment::text("Let me check."));
        assistant.segments.push(Segment::ToolCall(ToolCallSegment::new(
            "mcp_1",
            "search",
            json!({"q": "rust"}).as_object().cloned().unwrap(),
        )));
        let mut tool = Event::new(Role::Tool);
        tool.segments.push(Segment::ToolResult(ToolResultSegment {
            id: "mcp_1".into(),
            output: json!({"hits": 3}),
            error: None,
        }));
        EventLog::from_events(vec![
            Event::text(Role::System, "Respond in markdown."),
            Event::text(Role::User, "test"),
            assistant,
            tool,
        ])
    }

    #[test]
    fn test_items_with_default_server_label() {
        let items = encode_responses_input(&log(), Some("docs"));
        let value = serde_json::to_value(&items).unwrap();
        assert_eq!(value[0]["type"], "message");
        assert_eq!(value[0]["id"], "msg_0");
        assert_eq!(value[0]["role"], "system");
        assert_eq!(value[0]["content"][0]["type"], "input_text");
        assert_eq!(value[1]["content"][0]["text"], "test");
        assert_eq!(value[2]["type"], "reasoning");
        assert_eq!(value[2]["summary"][0], json!({"type": "summary_text", "text": "Plan"}));
        assert_eq!(value[3]["content"][0]["type"], "output_text");
        assert_eq!(value[4]["type"], "mcp_call");
        assert_eq!(value[4]["server_label"], "docs");
        assert_eq!(value[4]["output"], "{\"hits\":3}");
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn test_function_call_fallback_without_label() {
        let items = encode_responses_input(&log(), None);
        let value = serde_json::to_value(&items).unwrap();
        assert_eq!(value[4]["type"], "function_call");
        assert_eq!(value[4]["call_id"], "mcp_1");
        assert_eq!(value[5]["type"], "function_call_output");
        assert_eq!(value[5]["output"], "{\"hits\":3}");
    }

    #[test]
    fn test_request_options() {
        let options = RequestOptions {
            model: "gpt-5".into(),
            max_tokens: Some(8000),
            reasoning_effort: Some("low".into()),
            remote_servers: vec![RemoteServer {
                label: "docs".into(),
                url: "https://mcp.example".into(),
                require_approval: None,
            }],
            ..RequestOptions::default()
        };
        let body = serde_json::to_value(encode_responses_request(&log(), &options)).unwrap();
        assert_eq!(body["max_output_tokens"], 8000);
        assert_eq!(body["reasoning"], json!({"effort": "low", "summary": "detailed"}));
        assert_eq!(body["tools"][0]["type"], "mcp");
        assert_eq!(body["input"][4]["server_label"], "docs");
    }
}
