//! anthropic-style typed content-block events.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::FrameDecoder;
use crate::message::ToolCallRequest;
use crate::provider::{ChunkSink, UnifiedResponse};

/// A `tool_use` block that has started but not stopped
#[derive(Debug)]
struct OpenBlock {
    id: String,
    name: String,
    input_json: String,
}

impl OpenBlock {
    /// Partial input that does not parse becomes an empty object
    fn close(self) -> ToolCallRequest {
        let input = if self.input_json.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str::<Value>(&self.input_json).unwrap_or_else(|e| {
                tracing::debug!(tool = %self.name, error = %e, "Discarding unparsable tool input");
                Value::Object(Map::new())
            })
        };

        ToolCallRequest::new(self.id, self.name, input.to_string())
    }
}

/// Stream state for content-block events.
///
/// Calls are emitted in the order their blocks stop.
#[derive(Debug, Default)]
pub struct AnthropicFrames {
    text: String,
    open: HashMap<u64, OpenBlock>,
    completed: Vec<ToolCallRequest>,
}

impl FrameDecoder for AnthropicFrames {
    fn on_frame(&mut self, frame: &Value, on_chunk: &mut ChunkSink<'_>) {
        let index = frame["index"].as_u64().unwrap_or(0);

        match frame["type"].as_str() {
            Some("content_block_start") => {
                let block = &frame["content_block"];
                if block["type"] == "tool_use" {
                    self.open.insert(
                        index,
                        OpenBlock {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                            input_json: String::new(),
                        },
                    );
                }
            }
            Some("content_block_delta") => {
                let delta = &frame["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        if let Some(text) = delta["text"].as_str().filter(|s| !s.is_empty()) {
                            self.text.push_str(text);
                            on_chunk(text);
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(block) = self.open.get_mut(&index) {
                            block.input_json
                                .push_str(delta["partial_json"].as_str().unwrap_or_default());
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                if let Some(block) = self.open.remove(&index) {
                    self.completed.push(block.close());
                }
            }
            _ => {}
        }
    }

    fn finish(self: Box<Self>) -> UnifiedResponse {
        if !self.open.is_empty() {
            tracing::debug!(open = self.open.len(), "Stream ended with unterminated tool_use blocks");
        }

        UnifiedResponse {
            text: self.text,
            tool_calls: self.completed,
            ..Default::default()
        }
    }
}
