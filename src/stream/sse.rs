//! SSE (Server-Sent Events) frame parser, encoder, and byte-stream adapter.
//!
//! Used in both directions: decoding provider responses and carrying the
//! envelope protocol to clients.
use super::SseEvent;
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

/// Terminal sentinel frame. Distinct from any valid JSON payload.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";
pub const DONE_DATA: &str = "[DONE]";

struct PendingEvents {
    events: SmallVec<[SseEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    fn new() -> Self {
        Self {
            events: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<SseEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<SseEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }
}

// ---------------------------------------------------------------------------
// SseParser: incremental SSE line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw text chunks split at arbitrary boundaries and it yields
/// fully-assembled [`SseEvent`] frames.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<u64>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete events parsed.
    ///
    /// - `event:` sets the type of the next frame
    /// - `data:` lines are joined with `\n` (one leading space stripped)
    /// - an empty line dispatches the frame
    /// - `:` lines are comments
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &buffer[processed_up_to..line_end];
            self.process_line(line.strip_suffix('\r').unwrap_or(line), out);
            processed_up_to = line_end + 1;
        }

        self.buffer = buffer;
        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if self.has_data {
                out.push(SseEvent {
                    event: self.event_type.take(),
                    data: std::mem::take(&mut self.data_buffer),
                    id: self.last_event_id.clone(),
                    retry: self.retry.take(),
                });
                self.has_data = false;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if self.has_data {
                self.data_buffer.push('\n');
            } else {
                self.has_data = true;
            }
            self.data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.event_type = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.last_event_id = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("retry:") {
            self.retry = value.trim().parse::<u64>().ok();
        }
    }

    /// Dispatch a trailing frame that was not followed by a blank line.
    pub fn finish_into(&mut self, out: &mut Vec<SseEvent>) {
        let buffer = std::mem::take(&mut self.buffer);
        let tail = &buffer[self.read_offset.min(buffer.len())..];
        if !tail.is_empty() {
            self.process_line(tail.strip_suffix('\r').unwrap_or(tail), out);
        }
        self.read_offset = 0;
        self.process_line("", out);
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Encode an [`SseEvent`] into SSE wire text.
#[must_use]
pub fn encode_sse_event(event: &SseEvent) -> String {
    if event.event.is_none() && event.id.is_none() && !event.data.contains('\n') {
        return data_frame(&event.data);
    }

    let mut out = String::with_capacity(16 + event.data.len());
    if let Some(name) = event.event.as_deref() {
        out.push_str("event: ");
        out.push_str(name);
        out.push('\n');
    }
    for line in event.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    if let Some(id) = event.id.as_deref() {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// `data: <payload>\n\n`
#[must_use]
pub fn data_frame(payload: &str) -> String {
    let mut out = String::with_capacity(8 + payload.len());
    out.push_str("data: ");
    out.push_str(payload);
    out.push_str("\n\n");
    out
}

/// `event: <name>\ndata: <payload>\n\n`
#[must_use]
pub fn named_frame(event_type: &str, payload: &str) -> String {
    let mut out = String::with_capacity(18 + event_type.len() + payload.len());
    out.push_str("event: ");
    out.push_str(event_type);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(payload);
    out.push_str("\n\n");
    out
}

#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == DONE_DATA
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Feed `bytes` into `parser`, carrying an incomplete UTF-8 tail in `remainder`.
fn feed_utf8(
    parser: &mut SseParser,
    remainder: &mut Vec<u8>,
    bytes: &[u8],
    out: &mut Vec<SseEvent>,
) {
    remainder.extend_from_slice(bytes);
    let valid_up_to = match std::str::from_utf8(remainder) {
        Ok(text) => {
            parser.feed_into(text, out);
            remainder.len()
        }
        Err(err) => {
            let valid_up_to = err.valid_up_to();
            if let Ok(text) = std::str::from_utf8(&remainder[..valid_up_to]) {
                parser.feed_into(text, out);
            }
            valid_up_to
        }
    };
    remainder.drain(..valid_up_to);
}

/// Split a byte stream into SSE events using [`SseParser`].
///
/// Transport errors are passed through; the stream ends after the first one.
/// A trailing frame without a terminating blank line is still dispatched.
pub fn sse_frame_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent, E>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            SseParser::new(),
            Vec::<u8>::new(),
            Vec::<SseEvent>::with_capacity(8),
            PendingEvents::new(),
            false,
        ),
        |(mut stream, mut parser, mut remainder, mut parsed, mut pending, mut ended)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((
                        Ok(event),
                        (stream, parser, remainder, parsed, pending, ended),
                    ));
                }
                if ended {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        feed_utf8(&mut parser, &mut remainder, &bytes, &mut parsed);
                    }
                    Some(Err(err)) => {
                        ended = true;
                        return Some((
                            Err(err),
                            (stream, parser, remainder, parsed, pending, ended),
                        ));
                    }
                    None => {
                        ended = true;
                        parser.finish_into(&mut parsed);
                    }
                }
                pending.extend_from_vec(&mut parsed);
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::StreamExt;

    #[test]
    fn test_parse_simple_data_frame() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: hello world\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello world");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_parse_named_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
    }

    #[test]
    fn test_parse_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_parse_ignores_comments_and_keepalives() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\n\n: ping\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_parse_incremental_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: hel").is_empty());
        assert!(parser.feed("lo\n").is_empty());
        let events = parser.feed("\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_parse_crlf_and_retry() {
        let mut parser = SseParser::new();
        let events = parser.feed("retry: 1500\r\ndata: hello\r\n\r\n");
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[0].retry, Some(1500));
    }

    #[test]
    fn test_done_detection() {
        let mut parser = SseParser::new();
        let events = parser.feed(DONE_FRAME);
        assert!(is_done_event(&events[0]));
    }

    #[test]
    fn test_finish_dispatches_unterminated_frame() {
        let mut parser = SseParser::new();
        let mut out = Vec::new();
        parser.feed_into("data: tail", &mut out);
        assert!(out.is_empty());
        parser.finish_into(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "tail");
    }

    #[test]
    fn test_encode_helpers() {
        assert_eq!(data_frame("{}"), "data: {}\n\n");
        assert_eq!(named_frame("ping", "{}"), "event: ping\ndata: {}\n\n");
        let event = SseEvent {
            event: Some("ping".into()),
            data: "a\nb".into(),
            id: Some("7".into()),
            retry: None,
        };
        assert_eq!(encode_sse_event(&event), "event: ping\ndata: a\ndata: b\nid: 7\n\n");
    }

    #[tokio::test]
    async fn test_frame_stream_handles_split_utf8() {
        let text = "data: héllo\n\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let source = futures_util::stream::iter(vec![
            Ok::<Bytes, std::convert::Infallible>(Bytes::copy_from_slice(&text[..split])),
            Ok(Bytes::copy_from_slice(&text[split..])),
        ]);
        let events: Vec<_> = sse_frame_stream(source).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().data, "héllo");
    }

    #[tokio::test]
    async fn test_frame_stream_surfaces_transport_error() {
        let source = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err("reset"),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ]);
        let events: Vec<_> = sse_frame_stream(source).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, "one");
        assert_eq!(events[1].as_ref().unwrap_err(), &"reset");
    }
}
