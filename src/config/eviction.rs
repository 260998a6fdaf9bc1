use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Eviction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvictionConfig {
    /// Rows claimed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Pause between batches, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl EvictionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "eviction.batch_size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn default_batch_size() -> u32 {
    100
}

fn default_batch_delay_ms() -> u64 {
    50
}
