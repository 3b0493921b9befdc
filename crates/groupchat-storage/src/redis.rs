//! Redis backend for conversation history and memories
//!
//! History lives in one list per conversation (oldest at the head), memories
//! in another (newest at the head). Records are stored as JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use groupchat_core::{
    ChatError, HistoryRecord, HistoryStore, MemoryEntry, MemoryStore, Result, Role,
};

fn persistence_err(e: redis::RedisError) -> ChatError {
    ChatError::Persistence(e.to_string())
}

fn memory_err(e: redis::RedisError) -> ChatError {
    ChatError::Memory(e.to_string())
}

pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(persistence_err)?;
        Ok(Self {
            client,
            prefix: "groupchat:".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn history_key(&self, conversation_id: &str) -> String {
        format!("{}history:{}", self.prefix, conversation_id)
    }

    fn memories_key(&self, conversation_id: &str) -> String {
        format!("{}memories:{}", self.prefix, conversation_id)
    }

    fn conversations_set_key(&self) -> String {
        format!("{}conversations", self.prefix)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(persistence_err)
    }

    async fn read_history(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
        start: isize,
    ) -> Result<Vec<HistoryRecord>> {
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(-1)
            .query_async(conn)
            .await
            .map_err(persistence_err)?;

        raw.iter()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| ChatError::Persistence(e.to_string()))
            })
            .collect()
    }

    async fn read_memories(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
        stop: isize,
    ) -> Result<Vec<MemoryEntry>> {
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(stop)
            .query_async(conn)
            .await
            .map_err(memory_err)?;

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(|e| ChatError::Memory(e.to_string())))
            .collect()
    }

    /// Replaces a list with `items`, preserving their order head to tail.
    async fn rewrite_list(
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
        items: Vec<String>,
    ) -> std::result::Result<(), redis::RedisError> {
        redis::cmd("DEL").arg(key).query_async::<()>(conn).await?;
        if !items.is_empty() {
            redis::cmd("RPUSH")
                .arg(key)
                .arg(items)
                .query_async::<()>(conn)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for RedisStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let data = serde_json::to_string(&HistoryRecord::new(role, content))
            .map_err(|e| ChatError::Persistence(e.to_string()))?;

        redis::cmd("RPUSH")
            .arg(self.history_key(conversation_id))
            .arg(&data)
            .query_async::<()>(&mut conn)
            .await
            .map_err(persistence_err)?;

        redis::cmd("SADD")
            .arg(self.conversations_set_key())
            .arg(conversation_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(persistence_err)?;

        Ok(())
    }

    async fn read_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let start = -(limit.min(isize::MAX as usize) as isize);
        self.read_history(&mut conn, &self.history_key(conversation_id), start)
            .await
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;

        redis::cmd("DEL")
            .arg(self.history_key(conversation_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(persistence_err)?;
        redis::cmd("SREM")
            .arg(self.conversations_set_key())
            .arg(conversation_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(persistence_err)?;

        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let set_key = self.conversations_set_key();

        let conversations: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&set_key)
            .query_async(&mut conn)
            .await
            .map_err(persistence_err)?;

        for conversation_id in &conversations {
            redis::cmd("DEL")
                .arg(self.history_key(conversation_id))
                .query_async::<()>(&mut conn)
                .await
                .map_err(persistence_err)?;
        }

        redis::cmd("DEL")
            .arg(&set_key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(persistence_err)?;

        Ok(())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let len: usize = redis::cmd("LLEN")
            .arg(self.history_key(conversation_id))
            .query_async(&mut conn)
            .await
            .map_err(persistence_err)?;
        Ok(len)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.get_connection().await?;

        let conversations: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.conversations_set_key())
            .query_async(&mut conn)
            .await
            .map_err(persistence_err)?;

        let mut removed = 0;
        for conversation_id in conversations {
            let key = self.history_key(&conversation_id);
            let records = self.read_history(&mut conn, &key, 0).await?;
            let before = records.len();

            let kept = records
                .into_iter()
                .filter(|r| r.created_at >= cutoff)
                .map(|r| serde_json::to_string(&r))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ChatError::Persistence(e.to_string()))?;

            if kept.len() < before {
                removed += before - kept.len();
                Self::rewrite_list(&mut conn, &key, kept)
                    .await
                    .map_err(persistence_err)?;
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl MemoryStore for RedisStore {
    async fn append(&self, conversation_id: &str, text: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let data = serde_json::to_string(&MemoryEntry::new(text))
            .map_err(|e| ChatError::Memory(e.to_string()))?;

        redis::cmd("LPUSH")
            .arg(self.memories_key(conversation_id))
            .arg(&data)
            .query_async::<()>(&mut conn)
            .await
            .map_err(memory_err)?;

        Ok(())
    }

    async fn list(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<MemoryEntry>> {
        let stop = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(n) => n.min(isize::MAX as usize) as isize - 1,
            None => -1,
        };
        let mut conn = self.get_connection().await?;
        self.read_memories(&mut conn, &self.memories_key(conversation_id), stop)
            .await
    }

    async fn remove(&self, conversation_id: &str, text: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let key = self.memories_key(conversation_id);
        let entries = self.read_memories(&mut conn, &key, -1).await?;
        let before = entries.len();

        let kept = entries
            .into_iter()
            .filter(|m| m.text != text)
            .map(|m| serde_json::to_string(&m))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ChatError::Memory(e.to_string()))?;

        let removed = before - kept.len();
        if removed > 0 {
            Self::rewrite_list(&mut conn, &key, kept)
                .await
                .map_err(memory_err)?;
        }
        Ok(removed)
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        redis::cmd("DEL")
            .arg(self.memories_key(conversation_id))
            .query_async::<()>(&mut conn)
            .await
            .map_err(memory_err)?;
        Ok(())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let len: usize = redis::cmd("LLEN")
            .arg(self.memories_key(conversation_id))
            .query_async(&mut conn)
            .await
            .map_err(memory_err)?;
        Ok(len)
    }
}
