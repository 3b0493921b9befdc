//! Completion port

use async_trait::async_trait;
use thiserror::Error;

use crate::message::ChatMessage;
use crate::types::{CompletionRequest, LLMFeature, LLMResponse};

/// A hosted chat model. May be called several times per conversation turn.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        request: &CompletionRequest,
    ) -> Result<LLMResponse, LLMError>;

    fn provider_name(&self) -> &str;

    fn supports(&self, feature: LLMFeature) -> bool;
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API error: {message}")]
    API {
        message: String,
        status: Option<u16>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimit {
        retry_after: Option<std::time::Duration>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Serialization(err.to_string())
    }
}
