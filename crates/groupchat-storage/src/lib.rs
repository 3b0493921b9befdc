//! History and memory store backends for the group chat conversation engine

mod in_memory;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "redis-storage")]
mod redis;

pub use groupchat_core::{
    ChatError, HistoryRecord, HistoryStore, MemoryEntry, MemoryStore, Result,
};
pub use in_memory::{InMemoryHistoryStore, InMemoryMemoryStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "redis-storage")]
pub use redis::RedisStore;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "sqlite")]
    Sqlite { path: String },
    #[serde(rename = "redis")]
    Redis {
        url: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

/// The pair of stores the engine persists into. Both ports are usually
/// served by the same backend.
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn HistoryStore>,
    pub memory: Arc<dyn MemoryStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            history: Arc::new(InMemoryHistoryStore::new()),
            memory: Arc::new(InMemoryMemoryStore::new()),
        }
    }

    #[cfg_attr(not(any(feature = "sqlite", feature = "redis-storage")), allow(dead_code))]
    fn shared<S>(store: S) -> Self
    where
        S: HistoryStore + MemoryStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            history: store.clone(),
            memory: store,
        }
    }
}

pub async fn create_stores(config: &StorageConfig) -> Result<Option<Stores>> {
    match config {
        StorageConfig::None => Ok(None),
        StorageConfig::Memory => Ok(Some(Stores::in_memory())),

        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            tracing::info!(path = %path, "Opened SQLite store");
            Ok(Some(Stores::shared(store)))
        }

        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => Err(ChatError::Config(
            "SQLite storage requires 'sqlite' feature".into(),
        )),

        #[cfg(feature = "redis-storage")]
        StorageConfig::Redis { url, prefix } => {
            let mut store = RedisStore::new(url)?;
            if let Some(p) = prefix {
                store = store.with_prefix(p);
            }
            tracing::info!(prefix = %store.prefix(), "Opened Redis store");
            Ok(Some(Stores::shared(store)))
        }

        #[cfg(not(feature = "redis-storage"))]
        StorageConfig::Redis { .. } => Err(ChatError::Config(
            "Redis storage requires 'redis-storage' feature".into(),
        )),
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
#[cfg_attr(not(any(feature = "sqlite", test)), allow(dead_code))]
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg_attr(not(feature = "sqlite"), allow(dead_code))]
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_from_yaml() {
        let config: StorageConfig = serde_yaml::from_str("type: sqlite\npath: bot.db\n").unwrap();
        assert!(matches!(config, StorageConfig::Sqlite { ref path } if path == "bot.db"));

        let config: StorageConfig =
            serde_yaml::from_str("type: redis\nurl: redis://127.0.0.1/\n").unwrap();
        assert!(matches!(config, StorageConfig::Redis { prefix: None, .. }));

        assert!(matches!(StorageConfig::default(), StorageConfig::None));
    }

    #[tokio::test]
    async fn test_create_stores_none_and_memory() {
        assert!(create_stores(&StorageConfig::None).await.unwrap().is_none());

        let stores = create_stores(&StorageConfig::Memory).await.unwrap().unwrap();
        stores.memory.append("room-1", "likes tea").await.unwrap();
        assert_eq!(stores.memory.count("room-1").await.unwrap(), 1);
        assert_eq!(stores.history.count("room-1").await.unwrap(), 0);
    }

    #[cfg(not(feature = "sqlite"))]
    #[tokio::test]
    async fn test_sqlite_requires_feature() {
        let result = create_stores(&StorageConfig::Sqlite {
            path: "bot.db".into(),
        })
        .await;
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let a = timestamp(DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().into());
        let b = timestamp(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00.5Z")
                .unwrap()
                .into(),
        );
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
