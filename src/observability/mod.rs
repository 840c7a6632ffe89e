pub mod token_counter;

use std::time::Instant;

use crate::event::{EventLog, Usage};
use tracing_subscriber::EnvFilter;

/// Map a config log level to a tracing filter directive.
///
/// - "DISABLED" -> `None` (no subscriber installed)
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `json` switches the formatter to one JSON object per line.
pub fn init_tracing(log_level: &str, json: bool) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Log usage for one model turn, filling gaps with local estimates.
pub fn log_usage(model: &str, reported: Option<&Usage>, prompt: &EventLog, output_tokens: u64, start_time: Instant) {
    let usage = token_counter::merge_usage(
        reported,
        token_counter::estimate_log_tokens(prompt),
        output_tokens,
    );
    token_counter::log_turn_usage(model, &usage, start_time.elapsed());
}

/// Log the summary of a finished orchestrator turn.
pub fn log_turn_complete(conversation_id: &str, iterations: u32, appended: usize, outcome: &str, start_time: Instant) {
    tracing::info!(
        conversation_id,
        iterations,
        appended_events = appended,
        outcome,
        duration_seconds = start_time.elapsed().as_secs_f64(),
        "turn completed"
    );
}
