use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde_json::json;
use turnloom::builder::{BuilderConfig, EventBuilder};
use turnloom::event::{Role, Segment};
use turnloom::protocol::{StreamDelta, ToolArgs};
use turnloom::stream::{
    encode_envelope, envelope_stream, Envelope, EnvelopeDecoder, EnvelopeKind, EnvelopeProjector,
    ErrorCode, DONE_FRAME,
};

/// Envelopes a server would emit for one streamed assistant turn.
fn streamed_turn() -> Vec<Envelope> {
    let mut builder = EventBuilder::new(Role::Assistant, BuilderConfig::default());
    let mut projector = EnvelopeProjector::new();
    let mut out = Vec::new();

    projector.project_into(&builder.snapshot(), &mut out);
    for delta in [
        StreamDelta::Text("It is 21°C ".into()),
        StreamDelta::Text("in Paris.".into()),
        StreamDelta::ToolCallStart {
            id: "call_1".into(),
            name: "get_time".into(),
            server_label: None,
        },
        StreamDelta::ToolCallArgs {
            id: "call_1".into(),
            args: ToolArgs::Parsed(json!({"tz": "Europe/Paris"}).as_object().cloned().unwrap()),
        },
    ] {
        builder.apply(delta);
        projector.project_into(&builder.snapshot(), &mut out);
    }
    let event = builder.finalize().unwrap();
    projector.complete_into(&event, &mut out);
    out.push(Envelope::complete());
    out
}

fn wire(envelopes: &[Envelope]) -> String {
    let mut wire: String = envelopes
        .iter()
        .map(|envelope| encode_envelope(envelope).unwrap())
        .collect();
    wire.push_str(DONE_FRAME);
    wire
}

fn chunked(text: &str, size: usize) -> Vec<Result<Bytes, std::io::Error>> {
    text.as_bytes()
        .chunks(size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect()
}

#[test]
fn test_projected_turn_shape() {
    let envelopes = streamed_turn();
    let kinds: Vec<&str> = envelopes.iter().map(Envelope::kind_name).collect();
    assert_eq!(kinds.first(), Some(&"event_start"));
    assert_eq!(&kinds[kinds.len() - 2..], &["event_complete", "complete"]);
    assert!(kinds.contains(&"segment"));

    let EnvelopeKind::EventComplete { event } = &envelopes[envelopes.len() - 2].kind else {
        panic!("expected event_complete");
    };
    assert_eq!(event.text_content(), "It is 21°C in Paris.");
    let call = event.tool_calls().next().unwrap();
    assert_eq!(call.args["tz"], "Europe/Paris");
    assert!(matches!(event.segments[0], Segment::Text { .. }));
}

#[test]
fn test_decoder_survives_any_chunking() {
    let envelopes = streamed_turn();
    let text = wire(&envelopes);
    for size in 1..=9 {
        let mut decoder = EnvelopeDecoder::new();
        let mut decoded = Vec::new();
        let mut pending = Vec::new();
        for piece in text.as_bytes().chunks(size) {
            pending.extend_from_slice(piece);
            if let Ok(valid) = std::str::from_utf8(&pending) {
                decoder.feed_into(valid, &mut decoded);
                pending.clear();
            }
        }
        assert_eq!(decoded, envelopes, "chunk size {size}");
        assert!(decoder.is_done());
    }
}

#[tokio::test]
async fn test_envelope_stream_splits_multibyte_text() {
    let envelopes = streamed_turn();
    let text = wire(&envelopes);
    for size in [1, 2, 3, 7, 64] {
        let decoded: Vec<Envelope> = envelope_stream(stream::iter(chunked(&text, size)))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(decoded, envelopes, "chunk size {size}");
    }
}

#[tokio::test]
async fn test_envelope_stream_stops_at_done() {
    let mut text = wire(&[Envelope::complete()]);
    text.push_str(&encode_envelope(&Envelope::error(ErrorCode::InternalError, "late")).unwrap());
    let decoded: Vec<Envelope> = envelope_stream(stream::iter(chunked(&text, 5)))
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(decoded.len(), 1);
    assert!(decoded[0].is_terminal());
}

#[tokio::test]
async fn test_envelope_stream_skips_bad_frames_and_ends_on_close() {
    let text = concat!(
        ": keep-alive\n\n",
        "data: {\"type\":\"nonsense\"}\n\n",
        "data: not json\n\n",
        "data: {\"type\":\"error\",\"code\":\"provider_unavailable\",\"message\":\"overloaded\"}\n\n",
        "data: {\"type\":\"complete\"}",
    );
    let decoded: Vec<Envelope> = envelope_stream(stream::iter(chunked(text, 11)))
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(decoded.len(), 2);
    assert_eq!(
        decoded[0].kind,
        EnvelopeKind::Error {
            code: ErrorCode::ProviderUnavailable,
            message: "overloaded".into(),
        }
    );
    assert_eq!(decoded[1].kind, EnvelopeKind::Complete);
}

#[tokio::test]
async fn test_envelope_stream_surfaces_transport_error() {
    let first = encode_envelope(&Envelope::complete()).unwrap();
    let items: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(first)),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        Ok(Bytes::from_static(b"data: {\"type\":\"complete\"}\n\n")),
    ];
    let decoded: Vec<Result<Envelope, std::io::Error>> =
        envelope_stream(stream::iter(items)).collect().await;
    assert_eq!(decoded.len(), 2);
    assert!(decoded[0].as_ref().is_ok_and(Envelope::is_terminal));
    assert_eq!(
        decoded[1].as_ref().unwrap_err().kind(),
        std::io::ErrorKind::ConnectionReset
    );
}
