//! openai-style `delta` frames.

use std::collections::BTreeMap;

use serde_json::Value;

use super::FrameDecoder;
use crate::message::ToolCallRequest;
use crate::provider::{ChunkSink, UnifiedResponse};
use crate::tool_calls::synthesize_id;

/// Accumulates fragments of one streamed tool call
#[derive(Debug, Default)]
struct CallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl CallBuilder {
    fn absorb(&mut self, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) {
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            self.id = Some(id.to_string());
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            self.name = Some(name.to_string());
        }
        if let Some(arguments) = arguments {
            self.arguments.push_str(arguments);
        }
    }

    fn build(self, index: usize) -> ToolCallRequest {
        ToolCallRequest {
            id: self.id.unwrap_or_else(|| synthesize_id(index)),
            name: self.name.unwrap_or_default(),
            arguments: self.arguments,
        }
    }
}

/// Stream state for chat-completions deltas.
///
/// `delta.tool_calls` entries are keyed by their `index`; the legacy
/// `delta.function_call` form is kept aside and only used when no indexed
/// call was seen.
#[derive(Debug, Default)]
pub struct OpenAiFrames {
    text: String,
    calls: BTreeMap<usize, CallBuilder>,
    legacy: CallBuilder,
}

impl FrameDecoder for OpenAiFrames {
    fn on_frame(&mut self, frame: &Value, on_chunk: &mut ChunkSink<'_>) {
        let delta = &frame["choices"][0]["delta"];

        if let Some(content) = delta["content"].as_str().filter(|s| !s.is_empty()) {
            self.text.push_str(content);
            on_chunk(content);
        }

        let function_call = &delta["function_call"];
        if function_call.is_object() {
            self.legacy.absorb(
                None,
                function_call["name"].as_str(),
                function_call["arguments"].as_str(),
            );
        }

        for fragment in delta["tool_calls"].as_array().into_iter().flatten() {
            let index = fragment["index"]
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or(0);
            let function = &fragment["function"];
            self.calls.entry(index).or_default().absorb(
                fragment["id"].as_str(),
                function["name"].as_str(),
                function["arguments"].as_str(),
            );
        }
    }

    fn finish(self: Box<Self>) -> UnifiedResponse {
        let Self { text, calls, legacy } = *self;

        let mut tool_calls: Vec<ToolCallRequest> = calls
            .into_iter()
            .map(|(index, builder)| builder.build(index))
            .collect();

        if tool_calls.is_empty() && legacy.name.is_some() {
            tool_calls.push(legacy.build(0));
        }

        UnifiedResponse {
            text,
            tool_calls,
            ..Default::default()
        }
    }
}
