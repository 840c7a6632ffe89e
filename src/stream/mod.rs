pub mod envelope;
pub mod projector;
pub mod sse;

pub use envelope::{
    encode_envelope, envelope_stream, Envelope, EnvelopeDecoder, EnvelopeKind, EnvelopeMetadata,
    ErrorCode,
};
pub use projector::EnvelopeProjector;
pub use sse::{sse_frame_stream, SseParser, DONE_FRAME};

/// A parsed SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Unnamed `data`-only frame.
    #[must_use]
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Frame with an `event:` name.
    #[must_use]
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            ..Self::default()
        }
    }
}

/// Parse a single SSE frame from raw text.
///
/// Supports `\n\n` and `\r\n\r\n` separators; a frame without a trailing
/// blank line is still accepted.
#[must_use]
pub fn parse_sse_frame(raw: &str) -> Option<SseEvent> {
    let mut parser = SseParser::new();
    let mut out = Vec::with_capacity(1);
    parser.feed_into(raw, &mut out);
    if out.is_empty() {
        parser.finish_into(&mut out);
    }
    out.into_iter().next()
}
