//! Watch stream parser.
//!
//! A `?watch=true` response is a chunked body of newline-delimited JSON
//! objects, one `{"type": ..., "object": ...}` event per line. This parser:
//! - Buffers incoming bytes across chunk boundaries
//! - Splits on `\n` (tolerating `\r\n`)
//! - Decodes each non-blank line into a [`RawWatchEvent`]
//! - Skips lines that are not valid events
//! - Ends the stream on a transport error or end of body

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use kview_core::RawWatchEvent;
use tracing::{debug, warn};

/// Turn a chunked byte stream into a stream of watch events.
pub fn parse_watch_lines<S, E>(byte_stream: S) -> impl Stream<Item = RawWatchEvent> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.split_to(newline_pos + 1);
                    if let Some(event) = decode_line(&line) {
                        return Some((event, (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "watch stream read error");
                        return None;
                    }
                    None => {
                        // A final event without a trailing newline is still an event.
                        let event = decode_line(&buffer)?;
                        buffer.clear();
                        return Some((event, (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

fn decode_line(line: &[u8]) -> Option<RawWatchEvent> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawWatchEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, len = text.len(), "skipping undecodable watch line");
            debug!(line = text, "undecodable watch line");
            None
        }
    }
}
