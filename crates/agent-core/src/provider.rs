//! LLM Provider Strategy Pattern
//!
//! Defines the provider-agnostic request/response model and the common
//! interface the orchestrator talks to. Concrete adapters (HTTP, mocks in
//! tests) implement [`LlmProvider`] and pick a wire dialect once, at
//! construction.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{GenerationOptions, LlmProvider};
//!
//! let response = provider.chat(&messages, &tools, &GenerationOptions::default()).await?;
//! println!("{}", response.text);
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolDescriptor;

/// Path fragment that marks an anthropic-style endpoint when no dialect is configured
pub const ANTHROPIC_PATH_MARKER: &str = "/api/anthropic";

/// Receives text fragments while a streamed response is being read
pub type ChunkSink<'a> = dyn FnMut(&str) + Send + 'a;

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// openai-style `tool_choice`; only sent when tools are offered
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
}

const fn default_temperature() -> f32 { 0.7 }
const fn default_max_tokens() -> u32 { 2000 }
fn default_tool_choice() -> String { "auto".into() }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            tool_choice: default_tool_choice(),
        }
    }
}

/// Token usage statistics; zero when the provider does not report them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete model answer, whichever dialect or transport produced it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    /// Concatenated text output
    pub text: String,

    /// Structured tool calls, in the order the provider listed them
    pub tool_calls: Vec<ToolCallRequest>,

    pub usage: TokenUsage,
}

/// Wire protocol spoken by a provider endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Chat-completions JSON (`choices[].message`, `delta` stream frames)
    #[serde(rename = "openai")]
    OpenAi,
    /// Messages JSON (content blocks, typed stream events)
    Anthropic,
}

impl Dialect {
    /// Explicit configuration wins; otherwise the base URL decides.
    pub fn resolve(explicit: Option<Self>, base_url: &str) -> Self {
        explicit.unwrap_or_else(|| {
            if base_url.contains(ANTHROPIC_PATH_MARKER) {
                Self::Anthropic
            } else {
                Self::OpenAi
            }
        })
    }
}

impl FromStr for Dialect {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(AgentError::Config(format!("unknown LLM format '{other}'"))),
        }
    }
}

/// Connection settings for one provider. Immutable once an adapter owns it.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Display name (e.g., "deepseek", "glm")
    pub name: String,
    pub dialect: Dialect,
    pub api_key: String,
    pub base_url: String,

    /// Models tried in order by the fallback dispatcher
    pub candidate_models: Vec<String>,

    /// Per-request transport timeout
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Validate and build a configuration
    pub fn new(
        name: impl Into<String>,
        dialect: Dialect,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        candidate_models: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AgentError::Config("an API key is required".into()));
        }
        if candidate_models.is_empty() {
            return Err(AgentError::Config("at least one model is required".into()));
        }

        Ok(Self {
            name: name.into(),
            dialect,
            api_key,
            base_url: base_url.into(),
            candidate_models,
            timeout,
        })
    }

    /// First candidate, reported as the "current" model
    pub fn primary_model(&self) -> &str {
        self.candidate_models.first().map_or("", String::as_str)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("candidate_models", &self.candidate_models)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Strategy trait for LLM providers
///
/// The orchestrator works exclusively through this interface. Implementations
/// run their own model fallback; a returned error is final for the call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider display name
    fn name(&self) -> &str;

    /// Candidate models in fallback order
    fn models(&self) -> &[String];

    /// Buffered completion
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<UnifiedResponse>;

    /// Streamed completion. Text fragments reach `on_chunk` in transport order
    /// before the assembled response is returned.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<UnifiedResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 2000);
        assert_eq!(opts.tool_choice, "auto");
    }

    #[test]
    fn test_dialect_resolution() {
        assert_eq!(
            Dialect::resolve(None, "https://open.bigmodel.cn/api/anthropic"),
            Dialect::Anthropic
        );
        assert_eq!(
            Dialect::resolve(None, "https://api.deepseek.com/v1/chat/completions"),
            Dialect::OpenAi
        );
        assert_eq!(
            Dialect::resolve(Some(Dialect::OpenAi), "https://proxy/api/anthropic"),
            Dialect::OpenAi
        );
        assert_eq!("Anthropic".parse::<Dialect>().unwrap(), Dialect::Anthropic);
        assert!("grpc".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_config_requires_key_and_models() {
        let timeout = Duration::from_secs(60);
        assert!(ProviderConfig::new("x", Dialect::OpenAi, "", "u", vec!["m".into()], timeout).is_err());
        assert!(ProviderConfig::new("x", Dialect::OpenAi, "k", "u", vec![], timeout).is_err());

        let config =
            ProviderConfig::new("x", Dialect::OpenAi, "secret", "u", vec!["m1".into(), "m2".into()], timeout)
                .unwrap();
        assert_eq!(config.primary_model(), "m1");
        assert!(!format!("{config:?}").contains("secret"));
    }
}
