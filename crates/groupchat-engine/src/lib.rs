//! Conversation context engine for group chat bots
//!
//! Keeps a bounded window of turns per conversation, hydrates it from a
//! history store, lets the model save durable memories through a tool call
//! and writes every turn through to the store on a best-effort basis.

mod cache;
mod engine;
mod options;
mod persistence;
mod prompt;
mod record;

pub use cache::{ContextCache, trim_to_window};
pub use engine::{
    ConversationEngine, ConversationEngineBuilder, ConversationStats, DEFAULT_PRUNE_DAYS,
};
pub use options::RespondOptions;
pub use persistence::WriteThrough;
pub use prompt::{build_system_prompt, format_memories_for_prompt};
pub use record::{decode_record, encode_turn, restore_turns};
