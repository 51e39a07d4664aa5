//! anthropic-style messages codec.
//!
//! System messages move to the top-level `system` field; every other message
//! becomes a single text content block. Tool traffic is replayed as text: an
//! assistant turn keeps its text (or lists its calls when it has none), and a
//! tool result is sent as a `user` turn labelled with the tool name.

use serde::Serialize;
use serde_json::Value;

use super::{WireCodec, parse_body, token_count};
use crate::error::Result;
use crate::message::{Message, Role, ToolCallRequest};
use crate::provider::{Dialect, GenerationOptions, TokenUsage, UnifiedResponse};
use crate::stream::{AnthropicFrames, FrameDecoder};
use crate::tool::ToolDescriptor;

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<TextBlock>,
}

#[derive(Debug, Serialize)]
struct TextBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

// ── Codec ──────────────────────────────────────────────────────────────────────

/// Messages dialect with content blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicCodec;

impl WireCodec for AnthropicCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Anthropic
    }

    fn request_path(&self) -> &'static str {
        "/v1/messages"
    }

    fn encode(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        streaming: bool,
        model: &str,
    ) -> Result<Value> {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = MessagesRequest {
            model,
            messages: messages
                .iter()
                .filter(|m| m.role != Role::System)
                .filter_map(convert_message)
                .collect(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: streaming,
            system: (!system.is_empty()).then_some(system),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.parameters,
                })
                .collect(),
        };

        Ok(serde_json::to_value(&request)?)
    }

    fn decode(&self, body: &str) -> UnifiedResponse {
        let data = parse_body(body);
        let blocks = data["content"].as_array().map(Vec::as_slice).unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
                Some("tool_use") => tool_calls.push(decode_tool_use(block)),
                _ => {}
            }
        }

        let usage = &data["usage"];
        let prompt_tokens = token_count(usage, "input_tokens");
        let completion_tokens = token_count(usage, "output_tokens");
        UnifiedResponse {
            text,
            tool_calls,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens.saturating_add(completion_tokens),
            },
        }
    }

    fn frame_decoder(&self) -> Box<dyn FrameDecoder> {
        Box::new(AnthropicFrames::default())
    }
}

// ── Conversion helpers ─────────────────────────────────────────────────────────

/// Text blocks must be non-empty, so a tool-only assistant turn is replayed
/// as a description of its calls and a turn with no text at all is dropped.
fn convert_message(msg: &Message) -> Option<WireMessage> {
    let (role, text) = match msg.role {
        Role::Assistant if msg.content.is_empty() => ("assistant", describe_calls(&msg.tool_calls)),
        Role::Assistant => ("assistant", msg.content.clone()),
        Role::Tool => (
            "user",
            format!(
                "[tool result: {}]\n{}",
                msg.tool_name.as_deref().unwrap_or("unknown"),
                msg.content
            ),
        ),
        Role::User | Role::System => ("user", msg.content.clone()),
    };

    if text.is_empty() {
        tracing::debug!(role, "Dropping empty message from anthropic request");
        return None;
    }

    Some(WireMessage {
        role,
        content: vec![TextBlock { kind: "text", text }],
    })
}

fn describe_calls(calls: &[ToolCallRequest]) -> String {
    calls
        .iter()
        .map(|c| format!("[tool call: {} {}]", c.name, c.arguments))
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_tool_use(block: &Value) -> ToolCallRequest {
    let input = match &block["input"] {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };

    ToolCallRequest::new(
        block["id"].as_str().unwrap_or_default(),
        block["name"].as_str().unwrap_or_default(),
        input.to_string(),
    )
}
