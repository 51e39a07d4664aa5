//! # agent-core
//!
//! Provider-agnostic LLM protocol handling and the tool-calling conversation loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ SessionStore │  │ ToolExecutor │  │ LlmProvider (Strategy) │  │
//! │  │ MemoryStore  │  │ (registry)   │  │  fallback ─► WireCodec │  │
//! │  └──────────────┘  └──────────────┘  │            FrameDecoder│  │
//! │                                      └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two wire dialects are supported: openai-style chat completions and
//! anthropic-style messages. A [`WireCodec`] and its [`FrameDecoder`] turn
//! either into a [`UnifiedResponse`]; [`tool_calls`] normalizes the calls it
//! carries, including calls embedded as markup in the text.

pub mod codec;
pub mod error;
pub mod fallback;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod stream;
pub mod tool;
pub mod tool_calls;

pub use codec::{WireCodec, codec_for};
pub use error::{AgentError, Result};
pub use fallback::{FallbackChain, dispatch};
pub use memory::{InMemoryMemoryStore, MemoryStore};
pub use message::{Message, Role, ToolCallRequest, ToolCallResult};
pub use orchestrator::{ImportancePolicy, KeywordImportance, Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use provider::{ChunkSink, Dialect, GenerationOptions, LlmProvider, ProviderConfig, UnifiedResponse};
pub use session::{Session, SessionId, SessionStore};
pub use stream::{FrameDecoder, read_event_stream};
pub use tool::{Tool, ToolDescriptor, ToolExecutor, ToolRegistry};
