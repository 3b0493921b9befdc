//! Memory store port: durable conversation-scoped facts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A remembered fact. It has no identity beyond its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, conversation_id: &str, text: &str) -> Result<()>;

    /// Most recent first. `limit` of `None` returns everything.
    async fn list(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<MemoryEntry>>;

    /// Removes every memory whose text equals `text`, returning how many went.
    async fn remove(&self, conversation_id: &str, text: &str) -> Result<usize>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;

    /// Case-insensitive substring search, most recent first.
    async fn search(&self, conversation_id: &str, keyword: &str) -> Result<Vec<MemoryEntry>> {
        let needle = keyword.to_lowercase();
        Ok(self
            .list(conversation_id, None)
            .await?
            .into_iter()
            .filter(|m| m.text.to_lowercase().contains(&needle))
            .collect())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        Ok(self.list(conversation_id, None).await?.len())
    }
}
