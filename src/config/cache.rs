use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Shared cache configuration.
///
/// The cache backs the response recorder's multi-replica locator and
/// short-lived lookups. Transient cache failures are logged and bypassed;
/// requests proceed against the primary store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CacheConfig {
    /// No caching.
    #[default]
    None,

    /// In-process memory cache. Single-node only; lost on restart.
    Memory,

    /// Redis. Required for multi-node deployments.
    #[cfg(feature = "redis")]
    Redis(RedisCacheConfig),
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CacheConfig::None | CacheConfig::Memory => Ok(()),
            #[cfg(feature = "redis")]
            CacheConfig::Redis(c) => c.validate(),
        }
    }
}

/// Redis cache configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
}

#[cfg(feature = "redis")]
impl RedisCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation("cache.url cannot be empty".into()));
        }
        Ok(())
    }
}
