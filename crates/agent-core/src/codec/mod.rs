//! Wire Codecs
//!
//! One [`WireCodec`] per provider dialect. A codec turns the unified message
//! list into the provider's request body, decodes a buffered response body,
//! and hands out the frame decoder used when the same provider streams.
//!
//! Decoding never fails: missing or mistyped fields become empty text, no
//! tool calls, and zero usage.

mod anthropic;
mod openai;

pub use anthropic::AnthropicCodec;
pub use openai::OpenAiCodec;

use serde_json::Value;

use crate::error::Result;
use crate::message::Message;
use crate::provider::{Dialect, GenerationOptions, UnifiedResponse};
use crate::stream::FrameDecoder;
use crate::tool::ToolDescriptor;

/// Provider wire protocol
pub trait WireCodec: Send + Sync {
    /// Dialect this codec speaks
    fn dialect(&self) -> Dialect;

    /// Path appended to the configured base URL
    fn request_path(&self) -> &'static str;

    /// Build the request body for one model
    fn encode(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        streaming: bool,
        model: &str,
    ) -> Result<Value>;

    /// Decode a buffered response body
    fn decode(&self, body: &str) -> UnifiedResponse;

    /// Fresh per-response state for reading this dialect's event stream
    fn frame_decoder(&self) -> Box<dyn FrameDecoder>;
}

/// Codec for a dialect
pub fn codec_for(dialect: Dialect) -> Box<dyn WireCodec> {
    match dialect {
        Dialect::OpenAi => Box::new(OpenAiCodec),
        Dialect::Anthropic => Box::new(AnthropicCodec),
    }
}

/// Parse a body leniently; anything that is not JSON reads as `null`
fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Response body is not JSON; treating as empty");
        Value::Null
    })
}

/// Unsigned token count at `key`, zero when absent
fn token_count(usage: &Value, key: &str) -> u32 {
    usage
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}
