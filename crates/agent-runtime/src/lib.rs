//! # agent-runtime
//!
//! Runtime integration for agent-core.
//!
//! - **http**: `HttpProvider`, the reqwest-backed `LlmProvider` for openai-style
//!   and anthropic-style endpoints
//! - **config**: provider presets (`glm`, `deepseek`, `kimi`) and environment loading
//! - **telemetry**: `tracing` subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{init_tracing, HttpProvider, Orchestrator};
//!
//! init_tracing()?;
//! let provider = HttpProvider::from_env()?;
//! let orchestrator = Orchestrator::builder()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! orchestrator.init().await?;
//! let reply = orchestrator.process("What time is it?", "default").await?;
//! ```

pub mod config;
pub mod http;
pub mod telemetry;

pub use config::{ProviderPreset, provider_config_from_env, provider_config_from_lookup};
pub use http::HttpProvider;
pub use telemetry::init_tracing;

// Re-export core types for convenience
pub use agent_core::{
    AgentError, LlmProvider, Message, Orchestrator, ProviderConfig, Result, Role, SessionStore, Tool,
    ToolRegistry,
};
