//! Completion providers for the group chat conversation engine

pub mod mock;
pub mod providers;

pub use groupchat_core::{
    ChatMessage, CompletionRequest, FinishReason, LLMError, LLMFeature, LLMProvider, LLMResponse,
    Role, TokenUsage, ToolCall, ToolChoice, ToolDefinition,
};
pub use mock::{MockCall, MockLLMProvider};
pub use providers::{OpenAICompatProvider, ProviderBuilder, ProviderConfig};
