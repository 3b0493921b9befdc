//! SQLite backend for conversation history and memories

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{parse_timestamp, timestamp};
use groupchat_core::{
    ChatError, HistoryRecord, HistoryStore, MemoryEntry, MemoryStore, Result, Role,
};

fn persistence_err(e: sqlx::Error) -> ChatError {
    ChatError::Persistence(e.to_string())
}

fn memory_err(e: sqlx::Error) -> ChatError {
    ChatError::Memory(e.to_string())
}

/// One database file serving both the history log and the memory table.
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub async fn new(path: &str) -> Result<Self> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(path)
            .map_err(persistence_err)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = sqlx::SqlitePool::connect_with(options)
            .await
            .map_err(persistence_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// A private database that lives as long as the store. Every query runs on
    /// a single pinned connection, since each SQLite connection to `:memory:`
    /// opens its own database.
    pub async fn in_memory() -> Result<Self> {
        let options =
            sqlx::sqlite::SqliteConnectOptions::from_str("sqlite::memory:").map_err(persistence_err)?;

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>)
            .connect_with(options)
            .await
            .map_err(persistence_err)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_history_conversation_id ON conversation_history(conversation_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_history_created_at ON conversation_history(created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                memory_text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_memories_conversation_id ON memories(conversation_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        Ok(())
    }

    fn memory_rows(rows: Vec<(String, String)>) -> Vec<MemoryEntry> {
        rows.into_iter()
            .map(|(text, created_at)| MemoryEntry {
                text,
                created_at: parse_timestamp(&created_at),
            })
            .collect()
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_history (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;
        Ok(())
    }

    async fn read_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT role, content, created_at
            FROM conversation_history
            WHERE conversation_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(persistence_err)?;

        let mut records = rows
            .into_iter()
            .map(|(role, content, created_at)| {
                let role = Role::from_str(&role).map_err(ChatError::Persistence)?;
                Ok(HistoryRecord {
                    role,
                    content,
                    created_at: parse_timestamp(&created_at),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        records.reverse();
        Ok(records)
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM conversation_history WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(persistence_err)?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM conversation_history")
            .execute(&self.pool)
            .await
            .map_err(persistence_err)?;
        Ok(())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conversation_history WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await
                .map_err(persistence_err)?;
        Ok(count as usize)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM conversation_history WHERE created_at < ?")
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await
            .map_err(persistence_err)?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn append(&self, conversation_id: &str, text: &str) -> Result<()> {
        sqlx::query("INSERT INTO memories (conversation_id, memory_text, created_at) VALUES (?, ?, ?)")
            .bind(conversation_id)
            .bind(text)
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(memory_err)?;
        Ok(())
    }

    async fn list(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<MemoryEntry>> {
        // A negative LIMIT means no limit in SQLite.
        let limit = limit.map_or(-1, sql_limit);
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT memory_text, created_at
            FROM memories
            WHERE conversation_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(memory_err)?;

        Ok(Self::memory_rows(rows))
    }

    async fn remove(&self, conversation_id: &str, text: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM memories WHERE conversation_id = ? AND memory_text = ?")
            .bind(conversation_id)
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(memory_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM memories WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(memory_err)?;
        Ok(())
    }

    async fn search(&self, conversation_id: &str, keyword: &str) -> Result<Vec<MemoryEntry>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT memory_text, created_at
            FROM memories
            WHERE conversation_id = ? AND instr(lower(memory_text), lower(?)) > 0
            ORDER BY id DESC
            "#,
        )
        .bind(conversation_id)
        .bind(keyword)
        .fetch_all(&self.pool)
        .await
        .map_err(memory_err)?;

        Ok(Self::memory_rows(rows))
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM memories WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await
                .map_err(memory_err)?;
        Ok(count as usize)
    }
}

/// SQLite binds integers as i64; anything larger is as good as no limit.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
