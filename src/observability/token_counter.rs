use crate::event::{Event, EventLog, Segment, Usage};
use crate::protocol::mapping::{tool_args_to_wire, tool_result_to_text};
use std::time::Duration;
use tracing::info;

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) to avoid loading model BPE tables.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the tokens contributed by one Event's segments.
#[must_use]
pub fn estimate_event_tokens(event: &Event) -> u64 {
    event
        .segments
        .iter()
        .map(|segment| match segment {
            Segment::Text { text } => estimate_tokens(text),
            Segment::ToolCall(call) => {
                estimate_tokens(&call.name) + estimate_tokens(&tool_args_to_wire(call))
            }
            Segment::ToolResult(result) => estimate_tokens(&tool_result_to_text(result)),
            Segment::Reasoning(reasoning) => reasoning
                .parts
                .iter()
                .map(|part| estimate_tokens(&part.text))
                .sum(),
        })
        .sum()
}

/// Estimate the prompt size of a whole Event Log.
#[must_use]
pub fn estimate_log_tokens(log: &EventLog) -> u64 {
    log.iter().map(estimate_event_tokens).sum()
}

/// Merge provider-reported usage with local estimates.
///
/// Non-zero reported values always win; only missing or zero fields are
/// filled from the estimates.
#[must_use]
pub fn merge_usage(reported: Option<&Usage>, estimated_input: u64, estimated_output: u64) -> Usage {
    let pick = |value: Option<u64>, estimate: u64| match value {
        Some(v) if v > 0 => Some(v),
        _ => Some(estimate),
    };
    Usage {
        input_tokens: pick(reported.and_then(|usage| usage.input_tokens), estimated_input),
        output_tokens: pick(reported.and_then(|usage| usage.output_tokens), estimated_output),
        reasoning_tokens: reported.and_then(|usage| usage.reasoning_tokens),
    }
}

/// Log token usage for one model turn at INFO level.
pub fn log_turn_usage(model: &str, usage: &Usage, duration: Duration) {
    info!(
        model = model,
        input_tokens = usage.input_tokens.unwrap_or(0),
        output_tokens = usage.output_tokens.unwrap_or(0),
        reasoning_tokens = usage.reasoning_tokens.unwrap_or(0),
        duration_seconds = duration.as_secs_f64(),
        "model turn completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Role, ToolCallSegment};
    use serde_json::json;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_estimate_event_counts_tool_calls() {
        let mut event = Event::text(Role::Assistant, "abcd");
        event.segments.push(Segment::ToolCall(ToolCallSegment::new(
            "c",
            "look",
            json!({"q": 1}).as_object().cloned().unwrap(),
        )));
        // "abcd" = 1, "look" = 1, {"q":1} = 2
        assert_eq!(estimate_event_tokens(&event), 4);
        let log = EventLog::from_events(vec![event.clone(), event]);
        assert_eq!(estimate_log_tokens(&log), 8);
    }

    #[test]
    fn test_merge_prefers_reported_non_zero() {
        let reported = Usage {
            input_tokens: Some(100),
            output_tokens: Some(0),
            reasoning_tokens: Some(7),
        };
        let merged = merge_usage(Some(&reported), 10, 20);
        assert_eq!(merged.input_tokens, Some(100));
        assert_eq!(merged.output_tokens, Some(20));
        assert_eq!(merged.reasoning_tokens, Some(7));

        let estimated = merge_usage(None, 10, 20);
        assert_eq!(estimated.input_tokens, Some(10));
        assert_eq!(estimated.reasoning_tokens, None);
    }
}
