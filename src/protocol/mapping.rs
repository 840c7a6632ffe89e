use serde_json::Value;

use crate::event::{Role, StopReason, ToolCallSegment, ToolResultSegment};

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn role_to_openai(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[must_use]
pub fn openai_role_to_role(s: &str) -> Role {
    match s {
        "system" | "developer" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        _ => Role::User,
    }
}

#[must_use]
pub fn role_to_anthropic(role: Role) -> &'static str {
    match role {
        // system is top-level and tool results travel in user messages
        Role::System | Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

// ---------------------------------------------------------------------------
// Stop reason mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn stop_to_openai(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndTurn => "stop",
        StopReason::ToolCalls => "tool_calls",
        StopReason::MaxTokens => "length",
        StopReason::ContentFilter => "content_filter",
    }
}

#[must_use]
pub fn openai_stop_to_reason(s: &str) -> StopReason {
    match s {
        "tool_calls" | "function_call" => StopReason::ToolCalls,
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

#[must_use]
pub fn anthropic_stop_to_reason(s: &str) -> StopReason {
    match s {
        "tool_use" => StopReason::ToolCalls,
        "max_tokens" => StopReason::MaxTokens,
        "refusal" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

// ---------------------------------------------------------------------------
// Tool output text
// ---------------------------------------------------------------------------

/// Render a tool output as the string content providers expect.
///
/// Strings pass through unquoted; every other value is serialized as JSON.
#[must_use]
pub fn tool_output_to_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Inverse of [`tool_output_to_text`]: structured JSON (objects and arrays)
/// is restored, anything else stays a string.
#[must_use]
pub fn tool_output_from_text(text: &str) -> Value {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value @ (Value::Object(_) | Value::Array(_))) =
            serde_json::from_str::<Value>(text)
        {
            return value;
        }
    }
    if text.is_empty() {
        return Value::Null;
    }
    Value::String(text.to_string())
}

/// Text sent to providers for a tool result; errors are prefixed so the
/// model sees them as content.
#[must_use]
pub fn tool_result_to_text(result: &ToolResultSegment) -> String {
    match &result.error {
        Some(error) if result.output.is_null() => format!("Error: {error}"),
        Some(error) => format!("Error: {error}\n{}", tool_output_to_text(&result.output)),
        None => tool_output_to_text(&result.output),
    }
}

/// Inverse of [`tool_result_to_text`] for a result flagged as an error:
/// the `Error: ` prefix is dropped and anything after the first newline is
/// the output.
#[must_use]
pub fn tool_error_from_text(text: &str) -> (Value, String) {
    let text = text.strip_prefix("Error: ").unwrap_or(text);
    match text.split_once('\n') {
        Some((error, output)) => (tool_output_from_text(output), error.to_string()),
        None => (Value::Null, text.to_string()),
    }
}

/// JSON argument string for a tool call. A call whose arguments failed to
/// parse is replayed with its raw buffer.
#[must_use]
pub fn tool_args_to_wire(call: &ToolCallSegment) -> String {
    if call.args_parse_error().is_some() {
        if let Some(raw) = call.raw_args() {
            return raw.to_string();
        }
    }
    serde_json::Value::Object(call.args.clone()).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roles_roundtrip_openai() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(openai_role_to_role(role_to_openai(role)), role);
        }
        assert_eq!(openai_role_to_role("developer"), Role::System);
    }

    #[test]
    fn test_stop_reasons() {
        assert_eq!(openai_stop_to_reason("tool_calls"), StopReason::ToolCalls);
        assert_eq!(anthropic_stop_to_reason("tool_use"), StopReason::ToolCalls);
        assert_eq!(anthropic_stop_to_reason("end_turn"), StopReason::EndTurn);
        assert_eq!(stop_to_openai(StopReason::MaxTokens), "length");
    }

    #[test]
    fn test_tool_output_text_roundtrip() {
        let object = json!({"temp": 21, "unit": "C"});
        assert_eq!(tool_output_from_text(&tool_output_to_text(&object)), object);

        let text = json!("42");
        assert_eq!(tool_output_from_text(&tool_output_to_text(&text)), text);

        assert_eq!(tool_output_from_text("{not json"), json!("{not json"));
    }

    #[test]
    fn test_tool_result_error_text() {
        let result = ToolResultSegment {
            id: "c".into(),
            output: Value::Null,
            error: Some("timed out".into()),
        };
        assert_eq!(tool_result_to_text(&result), "Error: timed out");
        assert_eq!(
            tool_error_from_text(&tool_result_to_text(&result)),
            (Value::Null, "timed out".to_string())
        );

        let partial = ToolResultSegment {
            id: "c".into(),
            output: json!({"rows": 3}),
            error: Some("truncated".into()),
        };
        assert_eq!(
            tool_error_from_text(&tool_result_to_text(&partial)),
            (json!({"rows": 3}), "truncated".to_string())
        );
        assert_eq!(tool_error_from_text("boom"), (Value::Null, "boom".to_string()));
    }

    #[test]
    fn test_failed_args_replay_raw_buffer() {
        let call = ToolCallSegment::new(
            "c",
            "f",
            crate::event::args_parse_error_marker("{\"a\":", "EOF"),
        );
        assert_eq!(tool_args_to_wire(&call), "{\"a\":");
        let clean = ToolCallSegment::new("c", "f", json!({"a": 1}).as_object().cloned().unwrap());
        assert_eq!(tool_args_to_wire(&clean), "{\"a\":1}");
    }
}
