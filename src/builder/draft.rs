use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::event::{
    args_parse_error_marker, Event, ReasoningPart, ReasoningSegment, ResponseMetadata, Role,
    Segment, ToolArgsObject, ToolCallSegment, ToolResultSegment,
};
use crate::protocol::delta::{ReasoningDelta, ToolArgs};
use crate::protocol::tool_args::parse_tool_args;

/// Mutable accumulator for one in-flight Event.
///
/// Every mutation keeps existing segments in place; the only reordering is
/// among reasoning segments, which are kept sorted by
/// `(output_index, sequence_number)` inside the slots they already occupy.
#[derive(Debug, Clone)]
pub struct Draft {
    id: String,
    role: Role,
    ts: u64,
    segments: Vec<Segment>,
    response_metadata: Option<ResponseMetadata>,
    visible_started: bool,
    pending_args: FxHashMap<String, String>,
}

impl Draft {
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, ts: u64) -> Self {
        Self {
            id: id.into(),
            role,
            ts,
            segments: Vec::new(),
            response_metadata: None,
            visible_started: false,
            pending_args: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn has_pending_args(&self) -> bool {
        !self.pending_args.is_empty()
    }

    fn mark_visible(&mut self) {
        if self.visible_started {
            return;
        }
        self.visible_started = true;
        for segment in &mut self.segments {
            if let Segment::Reasoning(reasoning) = segment {
                reasoning.streaming = false;
            }
        }
    }

    /// Merge text into the trailing text segment, or open a new one when the
    /// last segment is something else.
    pub fn append_text(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.mark_visible();
        if let Some(Segment::Text { text: current }) = self.segments.last_mut() {
            current.push_str(text);
        } else {
            self.segments.push(Segment::text(text));
        }
        true
    }

    fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCallSegment> {
        self.segments.iter_mut().find_map(|segment| match segment {
            Segment::ToolCall(call) if call.id == id => Some(call),
            _ => None,
        })
    }

    /// Open a tool call, or stamp `started_at` on an existing one if unset.
    pub fn start_tool_call(
        &mut self,
        id: &str,
        name: &str,
        server_label: Option<&str>,
        now: u64,
    ) -> bool {
        if let Some(call) = self.tool_call_mut(id) {
            let mut changed = false;
            if call.started_at.is_none() {
                call.started_at = Some(now);
                changed = true;
            }
            if call.server_label.is_none() {
                if let Some(label) = server_label {
                    call.server_label = Some(label.to_string());
                    changed = true;
                }
            }
            return changed;
        }

        self.mark_visible();
        let mut call = ToolCallSegment::new(id, name, ToolArgsObject::new());
        call.server_label = server_label.map(str::to_string);
        call.started_at = Some(now);
        self.segments.push(Segment::ToolCall(call));
        self.pending_args.insert(id.to_string(), String::new());
        true
    }

    /// Buffer a raw argument fragment for a call whose args are still open.
    pub fn append_tool_args(&mut self, id: &str, fragment: &str) -> bool {
        match self.pending_args.get_mut(id) {
            Some(raw) => {
                raw.push_str(fragment);
                true
            }
            None => {
                tracing::debug!(tool_call_id = %id, "argument fragment for a closed or unknown tool call");
                false
            }
        }
    }

    /// Replace a call's arguments. Only JSON objects are accepted.
    pub fn set_tool_args(&mut self, id: &str, args: Value) -> bool {
        let Value::Object(map) = args else {
            tracing::debug!(tool_call_id = %id, "ignoring non-object tool arguments");
            return false;
        };
        let Some(call) = self.tool_call_mut(id) else {
            tracing::debug!(tool_call_id = %id, "arguments for unknown tool call");
            return false;
        };
        call.args = map;
        self.pending_args.remove(id);
        true
    }

    /// Store the explicit parse-error marker in place of the arguments.
    pub fn fail_tool_args(&mut self, id: &str, raw: &str, message: &str) -> bool {
        let Some(call) = self.tool_call_mut(id) else {
            tracing::debug!(tool_call_id = %id, "argument failure for unknown tool call");
            return false;
        };
        call.args = args_parse_error_marker(raw, message);
        self.pending_args.remove(id);
        tracing::warn!(tool_call_id = %id, error = %message, "tool arguments failed to parse");
        true
    }

    pub fn apply_tool_args(&mut self, id: &str, args: ToolArgs) -> bool {
        match args {
            ToolArgs::Parsed(map) => self.set_tool_args(id, Value::Object(map)),
            ToolArgs::Failed { raw, message } => self.fail_tool_args(id, &raw, &message),
        }
    }

    /// Stamp `completed_at` on the call (if it lives in this draft) and
    /// append the result segment.
    pub fn complete_tool(
        &mut self,
        id: &str,
        output: Option<Value>,
        error: Option<String>,
        now: u64,
    ) -> bool {
        let duplicate = self.segments.iter().any(
            |segment| matches!(segment, Segment::ToolResult(result) if result.id == id),
        );
        if duplicate {
            tracing::warn!(tool_call_id = %id, "duplicate tool_result ignored");
            return false;
        }
        if let Some(call) = self.tool_call_mut(id) {
            call.completed_at = Some(now);
        }
        self.mark_visible();
        self.segments.push(Segment::ToolResult(ToolResultSegment {
            id: id.to_string(),
            output: output.unwrap_or(Value::Null),
            error,
        }));
        true
    }

    /// Merge one reasoning summary delta.
    pub fn upsert_reasoning(&mut self, delta: &ReasoningDelta) -> bool {
        let position = self.segments.iter().position(
            |segment| matches!(segment, Segment::Reasoning(r) if r.id == delta.reasoning_id),
        );
        let position = match position {
            Some(position) => position,
            None => {
                let mut reasoning = ReasoningSegment::new(&delta.reasoning_id, delta.output_index);
                reasoning.streaming = !self.visible_started;
                self.segments.push(Segment::Reasoning(reasoning));
                self.segments.len() - 1
            }
        };

        if let Segment::Reasoning(reasoning) = &mut self.segments[position] {
            merge_reasoning_part(reasoning, delta);
        }
        self.sort_reasoning_slots();
        true
    }

    fn sort_reasoning_slots(&mut self) {
        let slots: Vec<usize> = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.is_reasoning())
            .map(|(index, _)| index)
            .collect();
        if slots.len() < 2 {
            return;
        }
        let mut reasoning: Vec<Segment> = slots
            .iter()
            .map(|&index| std::mem::replace(&mut self.segments[index], Segment::text("")))
            .collect();
        reasoning.sort_by_key(|segment| match segment {
            Segment::Reasoning(r) => (r.output_index, r.sequence_number),
            _ => (u32::MAX, u64::MAX),
        });
        for (slot, segment) in slots.into_iter().zip(reasoning) {
            self.segments[slot] = segment;
        }
    }

    pub fn merge_metadata(&mut self, metadata: ResponseMetadata) {
        self.response_metadata
            .get_or_insert_with(ResponseMetadata::default)
            .merge(metadata);
    }

    /// Parse every argument buffer still open; failures become the marker.
    pub fn resolve_pending_args(&mut self) {
        let pending: Vec<(String, String)> = self.pending_args.drain().collect();
        for (id, raw) in pending {
            if raw.trim().is_empty() {
                continue;
            }
            match parse_tool_args(&raw) {
                ToolArgs::Parsed(map) => {
                    if let Some(call) = self.tool_call_mut(&id) {
                        call.args = map;
                    }
                }
                ToolArgs::Failed { raw, message } => {
                    self.fail_tool_args(&id, &raw, &message);
                }
            }
        }
    }

    pub fn strip_empty_text(&mut self) {
        self.segments
            .retain(|segment| !matches!(segment, Segment::Text { text } if text.is_empty()));
    }

    pub fn end_streaming(&mut self) {
        for segment in &mut self.segments {
            if let Segment::Reasoning(reasoning) = segment {
                reasoning.streaming = false;
            }
        }
    }
}

fn merge_reasoning_part(reasoning: &mut ReasoningSegment, delta: &ReasoningDelta) {
    match reasoning
        .parts
        .iter_mut()
        .find(|part| part.summary_index == delta.summary_index)
    {
        Some(part) => {
            part.text.push_str(&delta.text);
            part.is_complete |= delta.is_complete;
            part.sequence_number = part.sequence_number.max(delta.sequence_number);
        }
        None => {
            reasoning.parts.push(ReasoningPart {
                summary_index: delta.summary_index,
                text: delta.text.clone(),
                is_complete: delta.is_complete,
                sequence_number: delta.sequence_number,
            });
            reasoning.parts.sort_by_key(|part| part.summary_index);
        }
    }
    reasoning.sequence_number = reasoning.sequence_number.max(delta.sequence_number);
}

/// Render the immutable view of a draft.
#[must_use]
pub fn snapshot(draft: &Draft) -> Event {
    let segments = draft
        .segments
        .iter()
        .map(|segment| match segment {
            Segment::Reasoning(reasoning) => {
                let mut reasoning = reasoning.clone();
                let joined = reasoning.joined_text();
                reasoning.combined_text = (!joined.is_empty()).then_some(joined);
                Segment::Reasoning(reasoning)
            }
            other => other.clone(),
        })
        .collect();
    Event {
        id: draft.id.clone(),
        role: draft.role,
        segments,
        ts: draft.ts,
        response_metadata: draft.response_metadata.clone(),
    }
}
