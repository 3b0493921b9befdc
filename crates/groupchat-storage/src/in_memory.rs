use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use groupchat_core::{HistoryRecord, HistoryStore, MemoryEntry, MemoryStore, Result, Role};

/// Process-local history log. Clones share the same log.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    records: Arc<RwLock<HashMap<String, Vec<HistoryRecord>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fully formed record, keeping its timestamp.
    pub fn append_record(&self, conversation_id: &str, record: HistoryRecord) {
        self.records
            .write()
            .entry(conversation_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        self.append_record(conversation_id, HistoryRecord::new(role, content));
        Ok(())
    }

    async fn read_recent(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>> {
        let records = self.records.read();
        match records.get(conversation_id) {
            Some(log) => {
                let start = log.len().saturating_sub(limit);
                Ok(log[start..].to_vec())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.records.write().remove(conversation_id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        Ok(self
            .records
            .read()
            .get(conversation_id)
            .map_or(0, |log| log.len()))
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write();
        let mut removed = 0;
        for log in records.values_mut() {
            let before = log.len();
            log.retain(|r| r.created_at >= cutoff);
            removed += before - log.len();
        }
        records.retain(|_, log| !log.is_empty());
        Ok(removed)
    }
}

/// Process-local memory store. Entries are kept oldest first and listed
/// newest first.
#[derive(Clone, Default)]
pub struct InMemoryMemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<MemoryEntry>>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn append(&self, conversation_id: &str, text: &str) -> Result<()> {
        self.entries
            .write()
            .entry(conversation_id.to_string())
            .or_default()
            .push(MemoryEntry::new(text));
        Ok(())
    }

    async fn list(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read();
        let newest_first = entries
            .get(conversation_id)
            .into_iter()
            .flat_map(|list| list.iter().rev())
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(newest_first)
    }

    async fn remove(&self, conversation_id: &str, text: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let Some(list) = entries.get_mut(conversation_id) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|m| m.text != text);
        Ok(before - list.len())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        self.entries.write().remove(conversation_id);
        Ok(())
    }

    async fn count(&self, conversation_id: &str) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .get(conversation_id)
            .map_or(0, |list| list.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_read_recent_is_oldest_first_and_bounded() {
        let store = InMemoryHistoryStore::new();
        for i in 0..5 {
            store
                .append("room-1", Role::User, &format!("msg{}", i))
                .await
                .unwrap();
        }

        let recent = store.read_recent("room-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "msg3");
        assert_eq!(recent[1].content, "msg4");

        assert!(store.read_recent("room-2", 10).await.unwrap().is_empty());
        assert!(store.read_recent("room-1", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_conversation() {
        let store = InMemoryHistoryStore::new();
        store.append("a", Role::User, "1").await.unwrap();
        store.append("b", Role::User, "2").await.unwrap();

        store.clear("a").await.unwrap();
        assert_eq!(store.count("a").await.unwrap(), 0);
        assert_eq!(store.count("b").await.unwrap(), 1);

        store.clear_all().await.unwrap();
        assert!(store.conversation_ids().is_empty());
    }

    #[tokio::test]
    async fn test_prune_before_cutoff() {
        let store = InMemoryHistoryStore::new();
        let old = HistoryRecord {
            created_at: Utc::now() - Duration::days(40),
            ..HistoryRecord::new(Role::User, "old")
        };
        store.append_record("room-1", old);
        store.append("room-1", Role::User, "new").await.unwrap();

        let removed = store
            .prune_before(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let left = store.read_recent("room-1", 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "new");
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store1 = InMemoryHistoryStore::new();
        let store2 = store1.clone();
        store1.append("room", Role::System, "sys").await.unwrap();
        assert_eq!(store2.count("room").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memories_listed_newest_first() {
        let store = InMemoryMemoryStore::new();
        store.append("room-1", "first").await.unwrap();
        store.append("room-1", "second").await.unwrap();
        store.append("room-1", "third").await.unwrap();

        let all = store.list("room-1", None).await.unwrap();
        let texts: Vec<_> = all.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second", "first"]);

        let limited = store.list("room-1", Some(1)).await.unwrap();
        assert_eq!(limited[0].text, "third");
    }

    #[tokio::test]
    async fn test_memory_remove_search_and_clear() {
        let store = InMemoryMemoryStore::new();
        store.append("room-1", "Alice likes Tea").await.unwrap();
        store.append("room-1", "Bob is on call").await.unwrap();
        store.append("room-1", "Alice likes Tea").await.unwrap();
        store.append("room-2", "unrelated tea").await.unwrap();

        let hits = store.search("room-1", "tea").await.unwrap();
        assert_eq!(hits.len(), 2);

        assert_eq!(store.remove("room-1", "Alice likes Tea").await.unwrap(), 2);
        assert_eq!(store.remove("room-1", "missing").await.unwrap(), 0);
        assert_eq!(store.count("room-1").await.unwrap(), 1);

        store.clear("room-1").await.unwrap();
        assert_eq!(store.count("room-1").await.unwrap(), 0);
        assert_eq!(store.count("room-2").await.unwrap(), 1);
    }
}
