use serde::{Deserialize, Serialize};

use super::ConfigError;

/// At-rest encryption key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Standard base64 of a 32-byte data-encryption key. Usually injected
    /// via `${ENGRAM_DEK_BASE64}`; the decoded key never appears in logs
    /// or API responses.
    pub key: String,
}

impl EncryptionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "encryption.key cannot be empty".into(),
            ));
        }
        Ok(())
    }
}
