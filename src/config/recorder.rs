use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Response recorder backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum RecorderConfig {
    /// Recording disabled; cancel is a no-op success, replay finds nothing.
    None,

    /// In-process recorder. Single-node only.
    #[default]
    Memory,

    /// Redis streams. Required for multi-replica resumption.
    #[cfg(feature = "redis")]
    Redis(RedisRecorderConfig),
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            RecorderConfig::None | RecorderConfig::Memory => Ok(()),
            #[cfg(feature = "redis")]
            RecorderConfig::Redis(c) => c.validate(),
        }
    }
}

/// Redis recorder configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisRecorderConfig {
    pub url: String,

    /// TTL applied to recording streams, in seconds. Bounds storage for
    /// recordings whose producer died without completing.
    #[serde(default = "default_stream_ttl")]
    pub stream_ttl_secs: u64,
}

#[cfg(feature = "redis")]
impl RedisRecorderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation(
                "recorder.url cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "redis")]
fn default_stream_ttl() -> u64 {
    3600
}
