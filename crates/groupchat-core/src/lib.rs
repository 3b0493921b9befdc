//! Core types and port traits for the group chat conversation engine

pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use error::{ChatError, Result, ToolError};
pub use message::{ChatMessage, Role, ToolCall};
pub use traits::history::{HistoryRecord, HistoryStore};
pub use traits::llm::{LLMError, LLMProvider};
pub use traits::memory::{MemoryEntry, MemoryStore};
pub use types::{
    CompletionRequest, FinishReason, LLMFeature, LLMResponse, TokenUsage, ToolChoice,
    ToolDefinition, ToolResult,
};
