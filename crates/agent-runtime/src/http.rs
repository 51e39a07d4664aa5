//! HTTP LLM Provider
//!
//! Implementation of `LlmProvider` over JSON/HTTPS. The wire dialect is
//! picked once from the configuration; both buffered and streamed calls run
//! through the model fallback chain.
//!
//! The configured timeout bounds connecting and every idle gap while reading.
//! Buffered calls are additionally capped at that total; a stream stays open
//! for as long as frames keep arriving.

use std::time::Duration;

use agent_core::{
    codec::{WireCodec, codec_for},
    error::{AgentError, Result},
    fallback::{FallbackChain, dispatch},
    message::Message,
    provider::{ChunkSink, Dialect, GenerationOptions, LlmProvider, ProviderConfig, UnifiedResponse},
    stream::read_event_stream,
    tool::ToolDescriptor,
};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;

/// `anthropic-version` header sent to anthropic-style endpoints
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token budget for [`HttpProvider::health_check`]
const HEALTH_CHECK_MAX_TOKENS: u32 = 10;

/// LLM provider speaking one of the supported HTTP dialects
pub struct HttpProvider {
    client: Client,
    codec: Box<dyn WireCodec>,
    config: ProviderConfig,
    endpoint: String,
}

impl HttpProvider {
    /// Create a provider; the HTTP client carries the idle timeouts and auth headers
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .default_headers(default_headers(&config)?)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        let codec = codec_for(config.dialect);
        let endpoint = if codec.request_path().is_empty() {
            config.base_url.clone()
        } else {
            format!("{}{}", config.base_url.trim_end_matches('/'), codec.request_path())
        };

        tracing::info!(
            provider = %config.name,
            dialect = ?config.dialect,
            models = ?config.candidate_models,
            endpoint = %endpoint,
            "LLM provider ready"
        );

        Ok(Self {
            client,
            codec,
            config,
            endpoint,
        })
    }

    /// Create from environment variables (see [`crate::config`])
    pub fn from_env() -> Result<Self> {
        Self::new(crate::config::provider_config_from_env()?)
    }

    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// URL every request is posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a one-word prompt and report whether any text came back
    pub async fn health_check(&self) -> Result<bool> {
        let options = GenerationOptions {
            max_tokens: HEALTH_CHECK_MAX_TOKENS,
            ..Default::default()
        };

        match self.chat(&[Message::user("ping")], &[], &options).await {
            Ok(response) => Ok(!response.text.trim().is_empty()),
            Err(e) => {
                tracing::warn!(provider = %self.config.name, error = %e, "LLM health check failed");
                Ok(false)
            }
        }
    }

    /// Post a body; non-2xx statuses become provider errors carrying the full body
    async fn post(&self, body: &Value, deadline: Option<Duration>) -> Result<reqwest::Response> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }
        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::provider(status.as_u16(), body));
        }

        Ok(response)
    }

    async fn chat_with_model(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<UnifiedResponse> {
        tracing::debug!(model, messages = messages.len(), tools = tools.len(), "Sending chat request");

        let body = self.codec.encode(messages, tools, options, false, model)?;
        let response = self.post(&body, Some(self.config.timeout)).await?;
        let text = response.text().await.map_err(transport)?;
        Ok(self.codec.decode(&text))
    }

    async fn stream_with_model(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<UnifiedResponse> {
        tracing::debug!(model, messages = messages.len(), tools = tools.len(), "Sending streaming request");

        let body = self.codec.encode(messages, tools, options, true, model)?;
        let response = self.post(&body, None).await?;
        read_event_stream(response.bytes_stream(), self.codec.frame_decoder(), on_chunk).await
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn models(&self) -> &[String] {
        &self.config.candidate_models
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
    ) -> Result<UnifiedResponse> {
        dispatch(&self.config.candidate_models, |model| async move {
            self.chat_with_model(&model, messages, tools, options).await
        })
        .await
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
        options: &GenerationOptions,
        on_chunk: &mut ChunkSink<'_>,
    ) -> Result<UnifiedResponse> {
        let mut chain = FallbackChain::new(&self.config.candidate_models);
        loop {
            let model = chain.next_model()?;
            match self
                .stream_with_model(model, messages, tools, options, &mut *on_chunk)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) => chain.record_failure(e)?,
            }
        }
    }
}

fn default_headers(config: &ProviderConfig) -> Result<HeaderMap> {
    let secret = |value: String| {
        HeaderValue::from_str(&value)
            .map(|mut v| {
                v.set_sensitive(true);
                v
            })
            .map_err(|_| AgentError::Config("API key contains characters not allowed in a header".into()))
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(AUTHORIZATION, secret(format!("Bearer {}", config.api_key))?);

    if config.dialect == Dialect::Anthropic {
        headers.insert(HeaderName::from_static("x-api-key"), secret(config.api_key.clone())?);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
    }

    Ok(headers)
}

fn transport(e: reqwest::Error) -> AgentError {
    AgentError::Transport(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dialect: Dialect, base_url: &str) -> ProviderConfig {
        ProviderConfig::new(
            "test",
            dialect,
            "sk-secret",
            base_url,
            vec!["m1".into()],
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_per_dialect() {
        let openai = HttpProvider::new(config(Dialect::OpenAi, "https://api.example.com/v1/chat/completions")).unwrap();
        assert_eq!(openai.endpoint(), "https://api.example.com/v1/chat/completions");

        let anthropic = HttpProvider::new(config(Dialect::Anthropic, "https://open.example.cn/api/anthropic/")).unwrap();
        assert_eq!(anthropic.endpoint(), "https://open.example.cn/api/anthropic/v1/messages");
    }

    #[test]
    fn test_headers_per_dialect() {
        let headers = default_headers(&config(Dialect::OpenAi, "u")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-secret");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(!headers.contains_key("x-api-key"));

        let headers = default_headers(&config(Dialect::Anthropic, "u")).unwrap();
        assert_eq!(headers["x-api-key"], "sk-secret");
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
    }

    #[test]
    fn test_bad_key_is_config_error() {
        let mut bad = config(Dialect::OpenAi, "u");
        bad.api_key = "line\nbreak".into();
        assert!(matches!(HttpProvider::new(bad), Err(AgentError::Config(_))));
    }
}
