//! Error Types

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Body patterns that mark an HTTP 400 as "unknown model" rather than a bad request
static MODEL_MISSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)model|not found|不存在").expect("static regex"));

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Connection or timeout failure reaching a provider
    #[error("LLM request failed: {0}")]
    Transport(String),

    /// Provider answered with a non-2xx status
    #[error("LLM API error: {status} - {body}")]
    Provider { status: u16, body: String },

    /// The event stream broke after the response started
    #[error("Streaming request failed: {0}")]
    StreamTransport(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Memory store failure
    #[error("Memory error: {0}")]
    Memory(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Build a provider error from a status code and a raw body
    pub fn provider(status: u16, body: impl Into<String>) -> Self {
        Self::Provider {
            status,
            body: body.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the next candidate model should be tried after this failure.
    ///
    /// Only a 404, or a 400 whose body names a missing model, moves the
    /// fallback chain forward. Auth failures, rate limits, 5xx and transport
    /// errors stop it.
    pub fn should_fallback(&self) -> bool {
        match self {
            Self::Provider { status: 404, .. } => true,
            Self::Provider { status: 400, body } => MODEL_MISSING.is_match(body),
            _ => false,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider { status: 401 | 403, .. } => {
                "Authentication failed. Please check your credentials.".into()
            }
            Self::Provider { status: 429, .. } => {
                "You've made too many requests. Please wait a moment.".into()
            }
            Self::Provider { status, .. } => {
                format!("The AI service encountered an error (HTTP {status}).")
            }
            Self::Transport(_) | Self::StreamTransport(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_falls_back() {
        assert!(AgentError::provider(404, "").should_fallback());
    }

    #[test]
    fn test_400_falls_back_only_for_missing_model() {
        assert!(AgentError::provider(400, r#"{"error":"Model Not Exist"}"#).should_fallback());
        assert!(AgentError::provider(400, "resource NOT FOUND").should_fallback());
        assert!(AgentError::provider(400, "模型不存在").should_fallback());
        assert!(!AgentError::provider(400, "max_tokens too large").should_fallback());
    }

    #[test]
    fn test_other_failures_do_not_fall_back() {
        assert!(!AgentError::provider(401, "model unauthorized").should_fallback());
        assert!(!AgentError::provider(429, "slow down").should_fallback());
        assert!(!AgentError::provider(503, "model overloaded").should_fallback());
        assert!(!AgentError::Transport("timeout".into()).should_fallback());
    }

    #[test]
    fn test_provider_message_includes_status_and_body() {
        let err = AgentError::provider(500, "boom");
        assert_eq!(err.to_string(), "LLM API error: 500 - boom");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_user_message_hides_internals() {
        assert_eq!(
            AgentError::provider(403, "key revoked").user_message(),
            "Authentication failed. Please check your credentials."
        );
        assert_eq!(
            AgentError::provider(502, "upstream stack trace").user_message(),
            "The AI service encountered an error (HTTP 502)."
        );
        assert_eq!(
            AgentError::StreamTransport("reset".into()).user_message(),
            "The AI service is currently unavailable. Please try again."
        );
        assert_eq!(
            AgentError::ToolNotFound("shell".into()).user_message(),
            "The tool 'shell' is not available."
        );
        assert_eq!(
            AgentError::Memory("disk full".into()).user_message(),
            "An unexpected error occurred."
        );
    }
}
