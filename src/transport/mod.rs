mod http_provider;
mod retry;

pub use http_provider::HttpModelProvider;

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt};

use crate::error::TurnError;
use crate::orchestrator::DeltaStream;
use crate::protocol::{ProviderStreamDecoder, StreamDelta};
use crate::stream::SseEvent;

/// Run SSE frames through a provider decoder, yielding canonical deltas.
///
/// The decoder is flushed when the frame stream ends so buffered tool
/// arguments still surface. A frame error ends the stream after it is yielded.
pub fn decode_delta_stream<S, E>(frames: S, decoder: Box<dyn ProviderStreamDecoder>) -> DeltaStream
where
    S: Stream<Item = Result<SseEvent, E>> + Send + 'static,
    E: Into<TurnError> + Send + 'static,
{
    let stream = futures_util::stream::unfold(
        (
            Box::pin(frames),
            decoder,
            VecDeque::<StreamDelta>::new(),
            Vec::<StreamDelta>::with_capacity(4),
            false,
        ),
        |(mut frames, mut decoder, mut pending, mut scratch, mut ended)| async move {
            loop {
                if let Some(delta) = pending.pop_front() {
                    return Some((Ok(delta), (frames, decoder, pending, scratch, ended)));
                }
                if ended {
                    return None;
                }
                match frames.as_mut().next().await {
                    Some(Ok(frame)) => decoder.decode_frame(&frame, &mut scratch),
                    Some(Err(err)) => {
                        ended = true;
                        return Some((Err(err.into()), (frames, decoder, pending, scratch, ended)));
                    }
                    None => {
                        ended = true;
                        decoder.finish(&mut scratch);
                    }
                }
                pending.extend(scratch.drain(..));
            }
        },
    );
    Box::pin(stream)
}
