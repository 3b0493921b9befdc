use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use groupchat::RespondOptions;
use groupchat::llm::providers::ProviderConfig;
use groupchat::storage::StorageConfig;

/// Everything the chat client needs, loaded from one YAML file.
///
/// ```yaml
/// provider:
///   base_url: https://api.moonshot.cn/v1
///   api_key_env: MOONSHOT_API_KEY
/// storage:
///   type: sqlite
///   path: groupchat.db
/// conversation:
///   system_prompt: You are the friendly bot of our book club.
///   use_persistence: true
///   use_memory: true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub conversation: RespondOptions,
}

impl BotConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Reads `explicit` if given. Otherwise the default location is used when
    /// it exists and built-in defaults when it does not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize config")
    }

    /// Flags given on the command line win over the file.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if overrides.persist {
            self.conversation.use_persistence = true;
            if matches!(self.storage, StorageConfig::None) {
                self.storage = StorageConfig::Memory;
            }
        }
        if overrides.memory {
            self.conversation.use_memory = true;
            if matches!(self.storage, StorageConfig::None) {
                self.storage = StorageConfig::Memory;
            }
        }
        if let Some(speaker) = &overrides.speaker {
            self.conversation.speaker = Some(speaker.clone());
        }
        if let Some(model) = &overrides.model {
            self.conversation.model = model.clone();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub persist: bool,
    pub memory: bool,
    pub speaker: Option<String>,
    pub model: Option<String>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("groupchat").join("config.yaml"))
}
