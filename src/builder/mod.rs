pub mod batch;
pub mod draft;

pub use draft::{snapshot, Draft};

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::event::{Event, ResponseMetadata, Role};
use crate::protocol::delta::{ReasoningDelta, StreamDelta, ToolArgs};
use crate::util::{next_id, unix_now_millis};
use batch::TextBatcher;

/// Receives an owned snapshot of the Event after every visible change.
pub type EventCallback = Box<dyn FnMut(Event) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    pub flush_interval: Duration,
    pub max_pending_chars: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(50),
            max_pending_chars: 256,
        }
    }
}

/// Single-turn assembler turning streaming deltas into one finalized Event.
///
/// The builder is synchronous and never sleeps. Text deltas are coalesced by
/// a [`TextBatcher`]; an async driver waits on [`EventBuilder::next_flush_deadline`]
/// and calls [`EventBuilder::poll_flush`] when it passes.
///
/// Every non-text mutation flushes buffered text first so the render order
/// of segments matches the arrival order of deltas.
pub struct EventBuilder {
    draft: Draft,
    batcher: TextBatcher,
    on_update: Option<EventCallback>,
    on_complete: Option<EventCallback>,
    disposed: bool,
    finalized: bool,
}

impl std::fmt::Debug for EventBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuilder")
            .field("draft", &self.draft)
            .field("disposed", &self.disposed)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

impl EventBuilder {
    /// Start a new Event with a fresh client-side id and the current time.
    #[must_use]
    pub fn new(role: Role, config: BuilderConfig) -> Self {
        Self::from_draft(Draft::new(next_id("evt"), role, unix_now_millis()), config)
    }

    #[must_use]
    pub fn from_draft(draft: Draft, config: BuilderConfig) -> Self {
        Self {
            draft,
            batcher: TextBatcher::new(config.flush_interval, config.max_pending_chars),
            on_update: None,
            on_complete: None,
            disposed: false,
            finalized: false,
        }
    }

    #[must_use]
    pub fn on_update(mut self, callback: impl FnMut(Event) + Send + 'static) -> Self {
        self.on_update = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_complete(mut self, callback: impl FnMut(Event) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.draft.id()
    }

    /// Whether deltas are still accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.disposed && !self.finalized
    }

    /// Current render state. Text still sitting in the batcher is not included.
    #[must_use]
    pub fn snapshot(&self) -> Event {
        snapshot(&self.draft)
    }

    fn emit_update(&mut self) {
        if let Some(callback) = self.on_update.as_mut() {
            callback(snapshot(&self.draft));
        }
    }

    fn accepting(&self, what: &'static str) -> bool {
        if !self.is_active() {
            tracing::trace!(event_id = %self.draft.id(), delta = what, "builder inactive, delta ignored");
            return false;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    pub fn append_text_delta(&mut self, text: &str) {
        self.append_text_delta_at(text, Instant::now());
    }

    /// Buffer a text delta observed at `now`; flushes when the batch is full
    /// or older than the flush interval.
    pub fn append_text_delta_at(&mut self, text: &str, now: Instant) {
        if !self.accepting("text") {
            return;
        }
        if self.batcher.push(text, now) {
            self.flush_text();
        }
    }

    #[must_use]
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        if self.is_active() {
            self.batcher.deadline()
        } else {
            None
        }
    }

    /// Flush buffered text if its deadline has passed. Returns whether a flush happened.
    pub fn poll_flush(&mut self, now: Instant) -> bool {
        if self.is_active() && self.batcher.is_due(now) {
            self.flush_text();
            return true;
        }
        false
    }

    /// Merge all buffered text into the draft immediately.
    pub fn flush_text(&mut self) {
        if let Some(text) = self.batcher.take() {
            if self.draft.append_text(&text) {
                self.emit_update();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tool calls
    // -----------------------------------------------------------------------

    pub fn start_tool_call(&mut self, id: &str, name: &str) {
        self.start_tool_call_with_label(id, name, None);
    }

    /// Idempotent: a repeated id only fills `started_at`/`server_label` if unset.
    pub fn start_tool_call_with_label(&mut self, id: &str, name: &str, server_label: Option<&str>) {
        if !self.accepting("tool_call_start") {
            return;
        }
        self.flush_text();
        if self
            .draft
            .start_tool_call(id, name, server_label, unix_now_millis())
        {
            self.emit_update();
        }
    }

    /// Buffer a raw argument fragment; parsed at finalization.
    pub fn append_tool_args_delta(&mut self, id: &str, fragment: &str) {
        if !self.accepting("tool_call_args_delta") {
            return;
        }
        self.draft.append_tool_args(id, fragment);
    }

    /// Replace the call's arguments with an already-parsed object.
    /// Anything other than a JSON object is ignored.
    pub fn finalize_tool_args(&mut self, id: &str, args: Value) {
        if !self.accepting("tool_call_args") {
            return;
        }
        if self.draft.set_tool_args(id, args) {
            self.emit_update();
        }
    }

    pub fn fail_tool_args(&mut self, id: &str, raw: &str, message: &str) {
        if !self.accepting("tool_call_args") {
            return;
        }
        if self.draft.fail_tool_args(id, raw, message) {
            self.emit_update();
        }
    }

    pub fn complete_tool(&mut self, id: &str, output: Option<Value>, error: Option<String>) {
        if !self.accepting("tool_result") {
            return;
        }
        self.flush_text();
        if self
            .draft
            .complete_tool(id, output, error, unix_now_millis())
        {
            self.emit_update();
        }
    }

    // -----------------------------------------------------------------------
    // Reasoning and metadata
    // -----------------------------------------------------------------------

    pub fn upsert_reasoning_part(&mut self, delta: &ReasoningDelta) {
        if !self.accepting("reasoning") {
            return;
        }
        self.flush_text();
        if self.draft.upsert_reasoning(delta) {
            self.emit_update();
        }
    }

    pub fn set_response_metadata(&mut self, metadata: ResponseMetadata) {
        if !self.accepting("metadata") {
            return;
        }
        self.draft.merge_metadata(metadata);
    }

    /// Dispatch one canonical delta. Terminal deltas are left to the caller.
    pub fn apply(&mut self, delta: StreamDelta) {
        match delta {
            StreamDelta::Text(text) => self.append_text_delta(&text),
            StreamDelta::ToolCallStart {
                id,
                name,
                server_label,
            } => self.start_tool_call_with_label(&id, &name, server_label.as_deref()),
            StreamDelta::ToolCallArgsDelta { id, fragment } => {
                self.append_tool_args_delta(&id, &fragment);
            }
            StreamDelta::ToolCallArgs { id, args } => match args {
                ToolArgs::Parsed(map) => self.finalize_tool_args(&id, Value::Object(map)),
                ToolArgs::Failed { raw, message } => self.fail_tool_args(&id, &raw, &message),
            },
            StreamDelta::ToolResult { id, output, error } => {
                self.complete_tool(&id, Some(output), error);
            }
            StreamDelta::Reasoning(delta) => self.upsert_reasoning_part(&delta),
            StreamDelta::Metadata(metadata) => self.set_response_metadata(metadata),
            StreamDelta::Done | StreamDelta::Error { .. } => {
                tracing::debug!(event_id = %self.draft.id(), "terminal delta handed to builder, ignored");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Flush, resolve every open argument buffer, strip empty text and hand
    /// the immutable Event to the completion callback.
    ///
    /// Allowed after [`EventBuilder::dispose`] so a cancelled turn keeps its
    /// partial content. Returns `None` only when already finalized.
    pub fn finalize(&mut self) -> Option<Event> {
        if self.finalized {
            tracing::debug!(event_id = %self.draft.id(), "finalize called twice");
            return None;
        }
        self.batcher.cancel();
        if let Some(text) = self.batcher.take() {
            self.draft.append_text(&text);
        }
        self.draft.resolve_pending_args();
        self.draft.strip_empty_text();
        self.draft.end_streaming();
        self.finalized = true;

        let event = snapshot(&self.draft);
        if let Some(callback) = self.on_complete.as_mut() {
            callback(event.clone());
        }
        Some(event)
    }

    /// Cancel the flush deadline and ignore every later delta.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.batcher.cancel();
    }
}
