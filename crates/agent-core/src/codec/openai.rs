//! openai-style chat-completions codec.

use serde::Serialize;
use serde_json::Value;

use super::{WireCodec, parse_body, token_count};
use crate::error::Result;
use crate::message::{Message, Role, ToolCallRequest};
use crate::provider::{Dialect, GenerationOptions, TokenUsage, UnifiedResponse};
use crate::stream::{FrameDecoder, OpenAiFrames};
use crate::tool::ToolDescriptor;

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

// ── Codec ──────────────────────────────────────────────────────────────────────

/// Chat-completions dialect: roles pass through, tool calls replay verbatim.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiCodec;

impl WireCodec for OpenAiCodec {
    fn dialect(&self) -> Dialect {
        Dialect::OpenAi
    }

    fn request_path(&self) -> &'static str {
        ""
    }

    fn encode(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        streaming: bool,
        model: &str,
    ) -> Result<Value> {
        let tools: Vec<FunctionTool<'_>> = tools.iter().map(convert_tool).collect();
        let tool_choice = (!tools.is_empty()).then_some(options.tool_choice.as_str());

        let request = ChatRequest {
            model,
            messages: messages.iter().map(convert_message).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: streaming,
            tools,
            tool_choice,
        };

        Ok(serde_json::to_value(&request)?)
    }

    fn decode(&self, body: &str) -> UnifiedResponse {
        let data = parse_body(body);
        let message = &data["choices"][0]["message"];

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| calls.iter().map(decode_tool_call).collect())
            .unwrap_or_default();

        let usage = &data["usage"];
        UnifiedResponse {
            text: message["content"].as_str().unwrap_or_default().to_string(),
            tool_calls,
            usage: TokenUsage {
                prompt_tokens: token_count(usage, "prompt_tokens"),
                completion_tokens: token_count(usage, "completion_tokens"),
                total_tokens: token_count(usage, "total_tokens"),
            },
        }
    }

    fn frame_decoder(&self) -> Box<dyn FrameDecoder> {
        Box::new(OpenAiFrames::default())
    }
}

// ── Conversion helpers ─────────────────────────────────────────────────────────

fn convert_message(msg: &Message) -> ChatMessage<'_> {
    let mut wire = ChatMessage {
        role: msg.role.as_str(),
        content: &msg.content,
        tool_call_id: None,
        name: None,
        tool_calls: Vec::new(),
    };

    match msg.role {
        Role::Tool => {
            wire.tool_call_id = msg.tool_call_id.as_deref().filter(|id| !id.is_empty());
            wire.name = msg.tool_name.as_deref();
        }
        Role::Assistant => {
            wire.tool_calls = msg
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunction {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect();
        }
        Role::System | Role::User => {}
    }

    wire
}

fn convert_tool(tool: &ToolDescriptor) -> FunctionTool<'_> {
    FunctionTool {
        kind: "function",
        function: FunctionDef {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.parameters,
        },
    }
}

/// Missing ids stay empty here; the normalizer fills them in.
fn decode_tool_call(call: &Value) -> ToolCallRequest {
    let function = &call["function"];
    let arguments = match &function["arguments"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    ToolCallRequest::new(
        call["id"].as_str().unwrap_or_default(),
        function["name"].as_str().unwrap_or_default(),
        arguments,
    )
}
