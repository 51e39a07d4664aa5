//! Long-term Memory Collaborator
//!
//! The orchestrator searches memory before each round and persists turns the
//! importance policy flags. Storage is behind [`MemoryStore`];
//! [`InMemoryMemoryStore`] is the process-local implementation used for
//! development and tests.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of memory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Fact,
    Event,
    Decision,
    Thought,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fact => "fact",
            Self::Event => "event",
            Self::Decision => "decision",
            Self::Thought => "thought",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryImportance {
    High,
    #[default]
    Medium,
    Low,
}

/// Item to store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: MemoryImportance,
    pub tags: Vec<String>,
}

/// Stored item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: MemoryImportance,
    pub tags: Vec<String>,
}

impl MemoryItem {
    pub fn new(data: NewMemory) -> Self {
        Self {
            id: format!("mem_{}", uuid::Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            content: data.content,
            memory_type: data.memory_type,
            importance: data.importance,
            tags: data.tags,
        }
    }

    fn matches(&self, query: &MemoryQuery) -> bool {
        if query.memory_type.is_some_and(|t| t != self.memory_type) {
            return false;
        }
        if !query.tags.is_empty() && !query.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        let keyword = query.keyword.to_lowercase();
        keyword.is_empty()
            || self.content.to_lowercase().contains(&keyword)
            || self.tags.join(" ").to_lowercase().contains(&keyword)
    }
}

/// Search parameters; an empty keyword matches everything
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryQuery {
    pub keyword: String,
    pub memory_type: Option<MemoryType>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Memory collaborator
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Prepare storage; called once before use
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Store an item
    async fn add(&self, item: NewMemory) -> Result<MemoryItem>;

    /// Matching items, newest first
    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryItem>>;

    /// Up to `limit` most recent items, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<MemoryItem>>;
}

/// Bounded in-process memory (for development/testing)
pub struct InMemoryMemoryStore {
    items: RwLock<Vec<MemoryItem>>,
    capacity: usize,
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl InMemoryMemoryStore {
    /// Keep at most `capacity` items; the oldest are evicted first
    pub fn new(capacity: usize) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn add(&self, item: NewMemory) -> Result<MemoryItem> {
        let item = MemoryItem::new(item);
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(0, item.clone());
        items.truncate(self.capacity);
        Ok(item)
    }

    async fn search(&self, query: &MemoryQuery) -> Result<Vec<MemoryItem>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<MemoryItem> = items.iter().filter(|i| i.matches(query)).cloned().collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MemoryItem>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.iter().take(limit).cloned().collect())
    }
}
