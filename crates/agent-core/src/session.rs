//! Session Management
//!
//! Per-session conversation history. The [`SessionStore`] is created by the
//! caller and handed to the orchestrator; sessions appear on first reference
//! and live until cleared.
//!
//! The store does not serialize rounds: callers must not run two rounds for
//! the same session id at once, or the history may interleave.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Session identifier used when the caller does not name one
pub const DEFAULT_SESSION: &str = "default";

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A conversation session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// History in conversation order
    pub messages: Vec<Message>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// The last `n` messages, oldest first
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// In-process session storage
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the session if it does not exist yet; returns a snapshot
    pub fn get_or_create(&self, id: &SessionId) -> Session {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()))
            .clone()
    }

    /// Snapshot of a session, if it exists
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }

    /// Append to a session, creating it first if needed
    pub fn append(&self, id: &SessionId, message: Message) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()))
            .push(message);
    }

    /// The last `n` messages of a session (empty if unknown)
    pub fn recent(&self, id: &SessionId, n: usize) -> Vec<Message> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).map(|s| s.recent(n).to_vec()).unwrap_or_default()
    }

    /// Full history of a session (empty if unknown)
    pub fn history(&self, id: &SessionId) -> Vec<Message> {
        self.get(id).map(|s| s.messages).unwrap_or_default()
    }

    /// Remove one session
    pub fn clear(&self, id: &SessionId) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id);
    }

    /// Remove every session
    pub fn clear_all(&self) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.clear();
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
