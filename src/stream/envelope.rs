use futures_util::{future, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::sse::{data_frame, is_done_event, sse_frame_stream, SseParser};
use super::SseEvent;
use crate::error::TurnError;
use crate::event::{Event, Segment};
use crate::util::unix_now_millis;

/// Stable error codes carried by `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ProviderError,
    ProviderUnavailable,
    TranslationError,
    ToolError,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ProviderError => "provider_error",
            ErrorCode::ProviderUnavailable => "provider_unavailable",
            ErrorCode::TranslationError => "translation_error",
            ErrorCode::ToolError => "tool_error",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopeKind {
    EventStart {
        event: Event,
    },
    Segment {
        event_id: String,
        index: usize,
        segment: Segment,
    },
    EventComplete {
        event: Event,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub timestamp: u64,
}

/// One server-to-client streaming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EnvelopeMetadata>,
}

impl Envelope {
    /// Wrap `kind` stamped with the current time.
    #[must_use]
    pub fn new(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            metadata: Some(EnvelopeMetadata {
                timestamp: unix_now_millis(),
            }),
        }
    }

    #[must_use]
    pub fn event_start(event: Event) -> Self {
        Self::new(EnvelopeKind::EventStart { event })
    }

    #[must_use]
    pub fn segment(event_id: impl Into<String>, index: usize, segment: Segment) -> Self {
        Self::new(EnvelopeKind::Segment {
            event_id: event_id.into(),
            index,
            segment,
        })
    }

    #[must_use]
    pub fn event_complete(event: Event) -> Self {
        Self::new(EnvelopeKind::EventComplete { event })
    }

    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Error {
            code,
            message: message.into(),
        })
    }

    #[must_use]
    pub fn complete() -> Self {
        Self::new(EnvelopeKind::Complete)
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EnvelopeKind::EventStart { .. } => "event_start",
            EnvelopeKind::Segment { .. } => "segment",
            EnvelopeKind::EventComplete { .. } => "event_complete",
            EnvelopeKind::Error { .. } => "error",
            EnvelopeKind::Complete => "complete",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EnvelopeKind::Complete)
    }
}

/// Encode one envelope as a `data: <json>\n\n` frame.
///
/// # Errors
///
/// Returns [`TurnError::Internal`] if the envelope cannot be serialized.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, TurnError> {
    let json = serde_json::to_string(envelope)
        .map_err(|err| TurnError::Internal(format!("envelope serialization failed: {err}")))?;
    Ok(data_frame(&json))
}

/// Decode one SSE frame. Unparseable frames are dropped with a diagnostic.
fn decode_frame(frame: &SseEvent) -> Option<Envelope> {
    if frame.data.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Envelope>(&frame.data) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            tracing::warn!(error = %err, bytes = frame.data.len(), "dropping unparseable envelope frame");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Client-side decoding
// ---------------------------------------------------------------------------

/// Incremental client-side decoder over raw SSE text.
#[derive(Debug, Default)]
pub struct EnvelopeDecoder {
    parser: SseParser,
    frames: Vec<SseEvent>,
    done: bool,
}

impl EnvelopeDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<Envelope> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Append every envelope completed by `chunk`. Frames after the sentinel
    /// are ignored.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<Envelope>) {
        self.parser.feed_into(chunk, &mut self.frames);
        for frame in self.frames.drain(..) {
            if self.done {
                tracing::debug!("frame after [DONE] ignored");
                continue;
            }
            if is_done_event(&frame) {
                self.done = true;
                continue;
            }
            if let Some(envelope) = decode_frame(&frame) {
                out.push(envelope);
            }
        }
    }
}

/// Async client iterator: bytes in, envelopes out, ending at `[DONE]` or
/// transport close.
pub fn envelope_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<Envelope, E>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    sse_frame_stream(byte_stream)
        .take_while(|item| future::ready(!matches!(item, Ok(frame) if is_done_event(frame))))
        .filter_map(|item| {
            future::ready(match item {
                Ok(frame) => decode_frame(&frame).map(Ok),
                Err(err) => Some(Err(err)),
            })
        })
}
