//! Stream Frame Reader
//!
//! Reassembles a `data: `-framed event stream into a [`UnifiedResponse`].
//! Framing is shared by both dialects; what a frame means is decided by the
//! dialect's [`FrameDecoder`].
//!
//! Text fragments are forwarded to the caller's sink as soon as their frame
//! is parsed, in transport order. Tool-call fragments are buffered per index
//! and only turned into [`ToolCallRequest`](crate::message::ToolCallRequest)s
//! when the stream ends.

mod anthropic;
mod openai;

pub use anthropic::AnthropicFrames;
pub use openai::OpenAiFrames;

use std::fmt::Display;
use std::pin::pin;

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::provider::{ChunkSink, UnifiedResponse};

/// Prefix of payload-carrying lines
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Per-response state for one dialect's stream frames
pub trait FrameDecoder: Send {
    /// Apply one decoded frame, forwarding any text to `on_chunk`
    fn on_frame(&mut self, frame: &Value, on_chunk: &mut ChunkSink<'_>);

    /// Flush buffered tool calls once the stream is over.
    /// Usage is never reported mid-stream, so it stays zero.
    fn finish(self: Box<Self>) -> UnifiedResponse;
}

/// Outcome of handling one line
enum Line {
    Continue,
    Done,
}

/// Read an event stream to its end (or the `[DONE]` sentinel).
///
/// Unparsable frames are skipped. A transport error fails the read with
/// [`AgentError::StreamTransport`]; text already forwarded stays forwarded.
pub async fn read_event_stream<S, B, E>(
    stream: S,
    mut decoder: Box<dyn FrameDecoder>,
    on_chunk: &mut ChunkSink<'_>,
) -> Result<UnifiedResponse>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = pin!(stream);
    let mut pending: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| AgentError::StreamTransport(e.to_string()))?;
        pending.extend_from_slice(bytes.as_ref());

        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            if let Line::Done = handle_line(&line, decoder.as_mut(), on_chunk) {
                return Ok(decoder.finish());
            }
        }
    }

    if !pending.is_empty() {
        handle_line(&pending, decoder.as_mut(), on_chunk);
    }

    Ok(decoder.finish())
}

fn handle_line(raw: &[u8], decoder: &mut dyn FrameDecoder, on_chunk: &mut ChunkSink<'_>) -> Line {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Continue;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Line::Done;
    }
    if payload.is_empty() {
        return Line::Continue;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(frame) => decoder.on_frame(&frame, on_chunk),
        Err(e) => tracing::trace!(error = %e, "Skipping malformed stream frame"),
    }
    Line::Continue
}
