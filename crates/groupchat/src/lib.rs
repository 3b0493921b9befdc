//! Conversation context engine for LLM-backed group chat bots

pub mod engine {
    pub use groupchat_engine::{
        ContextCache, ConversationEngine, ConversationEngineBuilder, ConversationStats,
        DEFAULT_PRUNE_DAYS, RespondOptions, WriteThrough, build_system_prompt,
        format_memories_for_prompt, trim_to_window,
    };
}

pub mod error {
    pub use groupchat_core::{ChatError, Result, ToolError};
}

pub mod llm {
    pub use groupchat_core::{
        ChatMessage, CompletionRequest, FinishReason, LLMError, LLMFeature, LLMProvider,
        LLMResponse, Role, TokenUsage, ToolCall, ToolChoice, ToolDefinition,
    };
    pub use groupchat_llm::{MockCall, MockLLMProvider};

    pub mod providers {
        pub use groupchat_llm::providers::{OpenAICompatProvider, ProviderBuilder, ProviderConfig};
    }
}

pub mod storage {
    pub use groupchat_core::{HistoryRecord, HistoryStore, MemoryEntry, MemoryStore};
    pub use groupchat_engine::{decode_record, encode_turn, restore_turns};
    pub use groupchat_storage::{
        InMemoryHistoryStore, InMemoryMemoryStore, StorageConfig, Stores, create_stores,
    };

    #[cfg(feature = "sqlite")]
    pub use groupchat_storage::SqliteStore;

    #[cfg(feature = "redis-storage")]
    pub use groupchat_storage::RedisStore;
}

pub mod tools {
    pub use groupchat_core::ToolResult;
    pub use groupchat_tools::{
        MEMORY_TOOL_NAME, MemoryToolArgs, ToolRequest, generate_schema, memory_tool_definition,
        save_memory,
    };
}

pub use engine::{ConversationEngine, RespondOptions};
pub use error::{ChatError, Result};
pub use llm::{ChatMessage, LLMProvider, Role};
