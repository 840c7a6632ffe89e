use serde_json::Value;

use crate::event::{ResponseMetadata, ToolArgsObject};

/// Outcome of parsing a tool call's streamed argument buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    Parsed(ToolArgsObject),
    Failed { raw: String, message: String },
}

/// Incremental update to one reasoning summary part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReasoningDelta {
    pub reasoning_id: String,
    pub output_index: u32,
    pub summary_index: u32,
    pub sequence_number: u64,
    pub text: String,
    pub is_complete: bool,
}

/// Provider-agnostic streaming delta consumed by the event builder.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Text(String),
    ToolCallStart {
        id: String,
        name: String,
        server_label: Option<String>,
    },
    ToolCallArgsDelta {
        id: String,
        fragment: String,
    },
    ToolCallArgs {
        id: String,
        args: ToolArgs,
    },
    ToolResult {
        id: String,
        output: Value,
        error: Option<String>,
    },
    Reasoning(ReasoningDelta),
    Metadata(ResponseMetadata),
    Done,
    Error {
        status: u16,
        message: String,
    },
}

impl StreamDelta {
    /// Short name used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StreamDelta::Text(_) => "text",
            StreamDelta::ToolCallStart { .. } => "tool_call_start",
            StreamDelta::ToolCallArgsDelta { .. } => "tool_call_args_delta",
            StreamDelta::ToolCallArgs { .. } => "tool_call_args",
            StreamDelta::ToolResult { .. } => "tool_result",
            StreamDelta::Reasoning(_) => "reasoning",
            StreamDelta::Metadata(_) => "metadata",
            StreamDelta::Done => "done",
            StreamDelta::Error { .. } => "error",
        }
    }
}
