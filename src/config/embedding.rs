use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Embedding source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum EmbeddingConfig {
    /// No embedding source; semantic search is unavailable.
    #[default]
    Disabled,

    /// OpenAI-compatible embeddings endpoint.
    Openai(OpenAiEmbeddingConfig),
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            EmbeddingConfig::Disabled => Ok(()),
            EmbeddingConfig::Openai(c) => c.validate(),
        }
    }
}

/// OpenAI embeddings configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiEmbeddingConfig {
    /// API key. Usually injected via `${OPENAI_API_KEY}`.
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OpenAiEmbeddingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Validation(
                "embedding.api_key cannot be empty".into(),
            ));
        }
        if self.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "embedding.base_url cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
