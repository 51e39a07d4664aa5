//! Conversation Orchestrator
//!
//! Runs one round per user message:
//!
//! ```text
//! user message ─► history ─► context (system prompt, memories, recent turns)
//!                                │
//!                                ▼
//!                         provider call (tools offered)
//!                                │
//!                 ┌──── tool calls? ────┐
//!                 │ no                  │ yes
//!                 ▼                     ▼
//!             reply text        execute tools in order
//!                                       │
//!                                       ▼
//!                         provider call (no tools) ─► reply text
//! ```
//!
//! The reply is appended to the session and, when the importance policy
//! says so, persisted to memory. Only provider failures escape a round; tool
//! and memory failures are absorbed.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::memory::{InMemoryMemoryStore, MemoryImportance, MemoryItem, MemoryQuery, MemoryStore, MemoryType, NewMemory};
use crate::message::{Message, ToolCallRequest, ToolCallResult};
use crate::provider::{ChunkSink, GenerationOptions, LlmProvider};
use crate::session::{SessionId, SessionStore};
use crate::tool::{ToolExecutor, ToolRegistry};
use crate::tool_calls::{self, parse_arguments, strip_markup};

/// Session id accepted by [`Orchestrator::clear_history`] to drop every session
pub const ALL_SESSIONS: &str = "all";

/// Keywords that make a turn worth remembering
pub const DEFAULT_IMPORTANCE_KEYWORDS: &[&str] = &[
    "记住", "重要", "决策", "计划", "TODO", "待办", "remember", "important", "decision", "plan",
];

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Name the assistant introduces itself with
    pub agent_name: String,

    /// Replaces the built-in prompt text when set
    pub system_prompt: Option<String>,

    /// Extra sections appended to the system prompt
    pub prompt_sections: Vec<String>,

    /// Most recent history messages sent as context
    pub history_window: usize,

    /// Memory hits summarized into the context
    pub memory_hits: usize,

    /// Characters kept from each memory in the summary
    pub memory_excerpt_chars: usize,

    /// Generation options for every provider call
    pub generation: GenerationOptions,

    /// Whether to list the available tools in the system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_name: "Assistant".into(),
            system_prompt: None,
            prompt_sections: Vec::new(),
            history_window: 10,
            memory_hits: 5,
            memory_excerpt_chars: 100,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are {name}, a helpful AI assistant.

When a tool would help, call it through the function-calling interface.
After receiving tool results, use them to answer the user.
If you can answer directly without tools, do so.
Be concise and accurate.";

/// Decides whether a finished turn is persisted to memory
pub trait ImportancePolicy: Send + Sync {
    fn is_important(&self, user_message: &str, reply: &str) -> bool;
}

impl<F> ImportancePolicy for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_important(&self, user_message: &str, reply: &str) -> bool {
        self(user_message, reply)
    }
}

/// Important when either side mentions a keyword (ASCII case-insensitive)
#[derive(Clone, Debug)]
pub struct KeywordImportance {
    keywords: Vec<String>,
}

impl KeywordImportance {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_ascii_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordImportance {
    fn default() -> Self {
        Self::new(DEFAULT_IMPORTANCE_KEYWORDS)
    }
}

impl ImportancePolicy for KeywordImportance {
    fn is_important(&self, user_message: &str, reply: &str) -> bool {
        let user_message = user_message.to_ascii_lowercase();
        let reply = reply.to_ascii_lowercase();
        self.keywords
            .iter()
            .any(|k| user_message.contains(k.as_str()) || reply.contains(k.as_str()))
    }
}

/// Counters reported by [`Orchestrator::stats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub sessions: usize,
    pub tools: usize,
    pub recent_memories: usize,
}

/// Number of memories inspected for [`OrchestratorStats::recent_memories`]
const RECENT_MEMORY_WINDOW: usize = 10;

/// The conversation loop
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolExecutor>,
    memory: Arc<dyn MemoryStore>,
    sessions: Arc<SessionStore>,
    importance: Arc<dyn ImportancePolicy>,
    config: OrchestratorConfig,
    system_prompt: String,
}

impl Orchestrator {
    /// Start building an orchestrator
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Prepare the memory store; call once before the first round
    pub async fn init(&self) -> Result<()> {
        self.memory.init().await
    }

    /// Prompt sent as the first message of every provider call
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one buffered round and return the reply
    pub async fn process(&self, message: &str, session_id: &str) -> Result<String> {
        let session = SessionId::from(session_id);
        if let Some(reply) = self.internal_command(message) {
            self.record_exchange(&session, message, &reply);
            return Ok(reply);
        }

        self.sessions.append(&session, Message::user(message));
        let context = self.build_context(&session, message).await;

        let first = self
            .provider
            .chat(&context, &self.tools.schema(), &self.config.generation)
            .await?;
        let (text, calls) = tool_calls::resolve(first.text, first.tool_calls);

        let reply = if calls.is_empty() {
            text
        } else {
            let follow_up = self.run_tools(context, text, calls).await;
            self.provider
                .chat(&follow_up, &[], &self.config.generation)
                .await?
                .text
        };

        Ok(self.finish_round(&session, message, strip_markup(&reply)).await)
    }

    /// Run one streamed round.
    ///
    /// Text from the first provider call reaches `on_chunk` as it arrives,
    /// with invoke markup removed. When tools ran, the follow-up reply is
    /// delivered as a single chunk.
    pub async fn process_stream(
        &self,
        message: &str,
        on_chunk: &mut ChunkSink<'_>,
        session_id: &str,
    ) -> Result<String> {
        let session = SessionId::from(session_id);
        if let Some(reply) = self.internal_command(message) {
            on_chunk(&reply);
            self.record_exchange(&session, message, &reply);
            return Ok(reply);
        }

        self.sessions.append(&session, Message::user(message));
        let context = self.build_context(&session, message).await;

        let mut forward = |chunk: &str| {
            let clean = strip_markup(chunk);
            if !clean.is_empty() {
                on_chunk(&clean);
            }
        };
        let first = self
            .provider
            .chat_stream(&context, &self.tools.schema(), &self.config.generation, &mut forward)
            .await?;
        let (text, calls) = tool_calls::resolve(first.text, first.tool_calls);

        let reply = if calls.is_empty() {
            strip_markup(&text)
        } else {
            let follow_up = self.run_tools(context, text, calls).await;
            let reply = self
                .provider
                .chat(&follow_up, &[], &self.config.generation)
                .await?
                .text;
            let reply = strip_markup(&reply);
            if !reply.is_empty() {
                on_chunk(&reply);
            }
            reply
        };

        Ok(self.finish_round(&session, message, reply).await)
    }

    /// Full history of a session
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions.history(&SessionId::from(session_id))
    }

    /// Drop one session, or every session for [`ALL_SESSIONS`]
    pub fn clear_history(&self, session_id: &str) {
        if session_id == ALL_SESSIONS {
            self.sessions.clear_all();
        } else {
            self.sessions.clear(&SessionId::from(session_id));
        }
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let recent_memories = match self.memory.recent(RECENT_MEMORY_WINDOW).await {
            Ok(items) => items.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read recent memories");
                0
            }
        };

        OrchestratorStats {
            sessions: self.sessions.len(),
            tools: self.tools.schema().len(),
            recent_memories,
        }
    }

    /// Answer `/model` and `/models` locally
    fn internal_command(&self, message: &str) -> Option<String> {
        let command = message.trim().strip_prefix('/')?.split_whitespace().next()?;
        let command = command.to_ascii_lowercase();
        if command != "model" && command != "models" {
            return None;
        }

        let current = self.provider.models().first().map_or("-", String::as_str);
        let mut lines = vec![
            format!("Current provider: {}", self.provider.name()),
            format!("Current model: {current}"),
        ];
        if command == "models" {
            lines.push("Available models:".into());
            lines.extend(self.provider.models().iter().map(|m| format!("- {m}")));
        } else {
            lines.push("This is an internal command. Switch models with /model or /models in the CLI.".into());
        }

        tracing::debug!(command = %command, "Answered internal command");
        Some(lines.join("\n"))
    }

    fn record_exchange(&self, session: &SessionId, message: &str, reply: &str) {
        self.sessions.append(session, Message::user(message));
        self.sessions.append(session, Message::assistant(reply));
    }

    /// System prompt, memory summary, then the recent history window.
    ///
    /// The window already ends with the current user message.
    async fn build_context(&self, session: &SessionId, message: &str) -> Vec<Message> {
        let mut context = vec![Message::system(self.system_prompt.clone())];

        let memories = self.relevant_memories(message).await;
        if !memories.is_empty() {
            context.push(Message::system(self.memory_summary(&memories)));
        }

        context.extend(self.sessions.recent(session, self.config.history_window));
        context
    }

    async fn relevant_memories(&self, message: &str) -> Vec<MemoryItem> {
        if self.config.memory_hits == 0 {
            return Vec::new();
        }

        let query = MemoryQuery::keyword(message).limit(self.config.memory_hits);
        match self.memory.search(&query).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Memory search failed; continuing without memories");
                Vec::new()
            }
        }
    }

    fn memory_summary(&self, memories: &[MemoryItem]) -> String {
        let lines: Vec<String> = memories
            .iter()
            .map(|m| {
                let excerpt: String = m.content.chars().take(self.config.memory_excerpt_chars).collect();
                format!("- [{}] {excerpt}...", m.memory_type)
            })
            .collect();
        format!("**Relevant memories**:\n{}", lines.join("\n"))
    }

    /// Execute every call in order and build the follow-up request
    async fn run_tools(
        &self,
        mut context: Vec<Message>,
        text: String,
        calls: Vec<ToolCallRequest>,
    ) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            results.push(self.execute_tool(call).await);
        }

        context.push(Message::assistant_with_tool_calls(text, calls));
        context.extend(results.into_iter().map(ToolCallResult::into_message));
        context
    }

    async fn execute_tool(&self, call: &ToolCallRequest) -> ToolCallResult {
        tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");

        match self.tools.call(&call.name, parse_arguments(&call.arguments)).await {
            Ok(value) => ToolCallResult::success(call, &value),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolCallResult::failure(call, e)
            }
        }
    }

    async fn finish_round(&self, session: &SessionId, message: &str, reply: String) -> String {
        self.sessions.append(session, Message::assistant(reply.clone()));

        if self.importance.is_important(message, &reply) {
            let item = NewMemory {
                content: format!("Q: {message}\nA: {reply}"),
                memory_type: MemoryType::Event,
                importance: MemoryImportance::High,
                tags: vec!["conversation".into()],
            };
            if let Err(e) = self.memory.add(item).await {
                tracing::warn!(error = %e, "Failed to persist conversation memory");
            }
        }

        reply
    }
}

fn build_system_prompt(config: &OrchestratorConfig, tools: &dyn ToolExecutor) -> String {
    let mut parts = vec![config
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.replace("{name}", &config.agent_name))];

    let schema = tools.schema();
    if config.inject_tool_descriptions && !schema.is_empty() {
        let listing: Vec<String> = schema
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect();
        parts.push(format!("Available tools:\n{}", listing.join("\n")));
    }

    parts.extend(
        config
            .prompt_sections
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    );
    parts.join("\n\n")
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<dyn ToolExecutor>>,
    memory: Option<Arc<dyn MemoryStore>>,
    sessions: Option<Arc<SessionStore>>,
    importance: Option<Arc<dyn ImportancePolicy>>,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: None,
            memory: None,
            sessions: None,
            importance: None,
            config: OrchestratorConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Share a session store with other components
    #[must_use]
    pub fn sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    #[must_use]
    pub fn importance(mut self, policy: impl ImportancePolicy + 'static) -> Self {
        self.importance = Some(Arc::new(policy));
        self
    }

    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn agent_name(mut self, name: impl Into<String>) -> Self {
        self.config.agent_name = name.into();
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn prompt_section(mut self, section: impl Into<String>) -> Self {
        self.config.prompt_sections.push(section.into());
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    /// Defaults: built-in tool registry, in-process memory, a fresh session
    /// store and keyword importance.
    pub fn build(self) -> Result<Orchestrator> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolRegistry::with_builtins()));
        let system_prompt = build_system_prompt(&self.config, tools.as_ref());

        Ok(Orchestrator {
            provider,
            tools,
            memory: self
                .memory
                .unwrap_or_else(|| Arc::new(InMemoryMemoryStore::default())),
            sessions: self.sessions.unwrap_or_default(),
            importance: self
                .importance
                .unwrap_or_else(|| Arc::new(KeywordImportance::default())),
            config: self.config,
            system_prompt,
        })
    }
}
