use serde::{Deserialize, Serialize};

use crate::cache::MIN_WINDOW;

/// Per-call settings for `ConversationEngine::respond`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondOptions {
    /// Base instruction for the system turn of a freshly initialized conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on the in-context turn list, system turn included
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,

    #[serde(default)]
    pub use_persistence: bool,

    #[serde(default)]
    pub use_memory: bool,

    /// Label prefixed to the utterance as "<speaker>: <utterance>". Leave unset
    /// when the caller already embeds the speaker in the utterance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

fn default_system_prompt() -> String {
    "You are a helpful AI assistant. Provide safe, helpful and accurate answers.".to_string()
}

fn default_model() -> String {
    "kimi-k2-turbo-preview".to_string()
}

fn default_temperature() -> f32 {
    0.6
}

fn default_max_history_length() -> usize {
    20
}

impl Default for RespondOptions {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            model: default_model(),
            temperature: default_temperature(),
            max_history_length: default_max_history_length(),
            use_persistence: false,
            use_memory: false,
            speaker: None,
        }
    }
}

impl RespondOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_history_length(mut self, max: usize) -> Self {
        self.max_history_length = max;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.use_persistence = enabled;
        self
    }

    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.use_memory = enabled;
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// `max_history_length` clamped to the smallest usable window: the system
    /// turn plus one more.
    pub(crate) fn window_len(&self) -> usize {
        self.max_history_length.max(MIN_WINDOW)
    }

    pub(crate) fn user_content(&self, utterance: &str) -> String {
        match &self.speaker {
            Some(speaker) => format!("{}: {}", speaker, utterance),
            None => utterance.to_string(),
        }
    }
}
