//! Process-local working set of conversation turns

use std::collections::HashMap;

use parking_lot::RwLock;

use groupchat_core::{ChatMessage, Role};

/// Maps conversation identifiers to their in-context turn lists.
///
/// Starts empty and is only emptied again by an explicit `delete` or
/// `clear`. The lock is never held across an await point, so callers work on
/// a copy of an entry and `set` it back.
#[derive(Debug, Default)]
pub struct ContextCache {
    entries: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<Vec<ChatMessage>> {
        self.entries.read().get(conversation_id).cloned()
    }

    pub fn set(&self, conversation_id: &str, turns: Vec<ChatMessage>) {
        self.entries.write().insert(conversation_id.to_string(), turns);
    }

    /// Returns true if an entry was evicted.
    pub fn delete(&self, conversation_id: &str) -> bool {
        self.entries.write().remove(conversation_id).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.entries.read().contains_key(conversation_id)
    }

    /// Number of cached turns for one conversation, 0 when absent.
    pub fn turn_count(&self, conversation_id: &str) -> usize {
        self.entries
            .read()
            .get(conversation_id)
            .map_or(0, |turns| turns.len())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

pub(crate) const MIN_WINDOW: usize = 2;

/// Bounds `turns` to `max_len` by keeping the system turn and the most recent
/// `max_len - 1` turns. Tool turns left at the head of the window without
/// their requesting assistant turn are dropped as well, so the result may be
/// shorter than `max_len` right after a tool round-trip.
///
/// Returns the number of turns removed.
pub fn trim_to_window(turns: &mut Vec<ChatMessage>, max_len: usize) -> usize {
    let max_len = max_len.max(MIN_WINDOW);
    if turns.len() <= max_len {
        return 0;
    }

    let before = turns.len();
    let cut = turns.len() - (max_len - 1);
    turns.drain(1..cut);

    let orphans = turns
        .iter()
        .skip(1)
        .take_while(|t| t.role == Role::Tool)
        .count();
    turns.drain(1..1 + orphans);

    before - turns.len()
}
