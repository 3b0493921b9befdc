//! History store port: a durable, per-conversation ordered log of turns

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only turn log keyed by conversation identifier.
///
/// Built-in backends: `InMemoryHistoryStore`, `SqliteStore` and `RedisStore`.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> Result<()>;

    /// Up to `limit` most recent records, oldest first.
    async fn read_recent(&self, conversation_id: &str, limit: usize)
    -> Result<Vec<HistoryRecord>>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;

    async fn clear_all(&self) -> Result<()>;

    async fn count(&self, conversation_id: &str) -> Result<usize>;

    /// Deletes records created before `cutoff` in every conversation.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
