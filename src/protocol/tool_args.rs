use rustc_hash::FxHashMap;
use serde_json::Value;

use super::delta::ToolArgs;
use crate::event::{args_parse_error_marker, ToolArgsObject};

/// Parse a complete argument buffer.
///
/// An empty buffer means "no arguments". Anything that is not a JSON object
/// is reported as a failure so callers can store the explicit marker.
#[must_use]
pub fn parse_tool_args(raw: &str) -> ToolArgs {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ToolArgs::Parsed(serde_json::Map::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ToolArgs::Parsed(map),
        Ok(other) => ToolArgs::Failed {
            raw: raw.to_string(),
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        },
        Err(err) => ToolArgs::Failed {
            raw: raw.to_string(),
            message: err.to_string(),
        },
    }
}

/// Arguments of a complete wire-format tool call: the parsed object, or the
/// parse-error marker carrying the raw text.
#[must_use]
pub fn args_from_wire(raw: &str) -> ToolArgsObject {
    match parse_tool_args(raw) {
        ToolArgs::Parsed(map) => map,
        ToolArgs::Failed { raw, message } => {
            tracing::warn!(error = %message, "tool call arguments failed to parse");
            args_parse_error_marker(&raw, &message)
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug)]
struct PendingArgs {
    id: String,
    raw: String,
}

/// Partial-JSON argument buffers keyed by provider block/output index.
#[derive(Debug, Default)]
pub struct ToolArgsBuffer {
    pending: FxHashMap<usize, PendingArgs>,
}

impl ToolArgsBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the call id owning `index`. A restart discards stale fragments.
    pub fn start(&mut self, index: usize, id: impl Into<String>) {
        self.pending.insert(
            index,
            PendingArgs {
                id: id.into(),
                raw: String::new(),
            },
        );
    }

    /// Append a fragment. Returns `false` when no call is registered at `index`.
    pub fn push(&mut self, index: usize, fragment: &str) -> bool {
        match self.pending.get_mut(&index) {
            Some(pending) => {
                pending.raw.push_str(fragment);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<&str> {
        self.pending.get(&index).map(|pending| pending.id.as_str())
    }

    /// Close the buffer at `index` and parse it.
    pub fn finish(&mut self, index: usize) -> Option<(String, ToolArgs)> {
        let pending = self.pending.remove(&index)?;
        let args = parse_tool_args(&pending.raw);
        Some((pending.id, args))
    }

    /// Close the buffer at `index`, preferring a provider-supplied complete
    /// argument string over the accumulated fragments.
    pub fn finish_with(&mut self, index: usize, complete: &str) -> Option<(String, ToolArgs)> {
        let pending = self.pending.remove(&index)?;
        let raw = if complete.is_empty() {
            pending.raw.as_str()
        } else {
            complete
        };
        Some((pending.id, parse_tool_args(raw)))
    }

    /// Close every open buffer in index order.
    pub fn finish_all(&mut self) -> Vec<(String, ToolArgs)> {
        let mut indices: Vec<usize> = self.pending.keys().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|index| self.finish(index))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
