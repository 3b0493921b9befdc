//! Error types shared by every crate in the workspace

use thiserror::Error;

use crate::traits::llm::LLMError;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("LLM error: {0}")]
    LLM(#[from] LLMError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Memory store error: {0}")]
    Memory(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures while turning a model tool invocation into an executed action.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::Persistence("connection refused".into());
        assert_eq!(err.to_string(), "Persistence error: connection refused");

        let err = ChatError::from(ToolError::InvalidArguments {
            tool: "add_memory".into(),
            reason: "missing field `memory_text`".into(),
        });
        assert_eq!(
            err.to_string(),
            "Tool error: Invalid arguments for tool 'add_memory': missing field `memory_text`"
        );
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: ChatError = LLMError::Network("timeout".into()).into();
        assert!(matches!(err, ChatError::LLM(LLMError::Network(_))));
    }
}
