//! Write-through of cached turns to the history store

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::record::encode_turn;
use groupchat_core::{ChatMessage, HistoryStore};

/// Best-effort history writer. A failed write is logged and dropped, never
/// retried, and never fails the conversation turn that produced it.
pub struct WriteThrough {
    store: Arc<dyn HistoryStore>,
    dropped: AtomicU64,
}

impl WriteThrough {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Returns true if the turn reached the store.
    pub async fn record(&self, conversation_id: &str, turn: &ChatMessage) -> bool {
        let content = match encode_turn(turn) {
            Ok(content) => content,
            Err(e) => {
                self.drop_write(conversation_id, turn, &e.to_string());
                return false;
            }
        };

        match self.store.append(conversation_id, turn.role, &content).await {
            Ok(()) => {
                debug!(conversation_id, role = %turn.role, "Persisted turn");
                true
            }
            Err(e) => {
                self.drop_write(conversation_id, turn, &e.to_string());
                false
            }
        }
    }

    fn drop_write(&self, conversation_id: &str, turn: &ChatMessage, error: &str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(conversation_id, role = %turn.role, error, "Dropping history write");
    }

    /// Writes dropped since construction.
    pub fn dropped_writes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WriteThrough {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteThrough")
            .field("dropped", &self.dropped_writes())
            .finish_non_exhaustive()
    }
}
