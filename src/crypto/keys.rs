use base64::{Engine as _, engine::general_purpose::STANDARD};

use super::envelope::{CryptoError, Envelope};
use crate::config::EncryptionConfig;

/// Process-wide provider of the data-encryption key, initialized at boot.
///
/// Holds the ready-to-use [`Envelope`]; key bytes are decoded once and
/// never retained in raw form outside the cipher.
#[derive(Clone, Debug)]
pub struct DekProvider {
    envelope: Envelope,
}

impl DekProvider {
    /// Build the provider from configuration. The configured key is
    /// standard base64 of exactly 32 bytes.
    pub fn from_config(config: &EncryptionConfig) -> Result<Self, CryptoError> {
        let key_bytes = STANDARD
            .decode(config.key.trim())
            .map_err(|_| CryptoError::InvalidKeyLength(0))?;
        Ok(Self {
            envelope: Envelope::new(&key_bytes)?,
        })
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    use super::*;

    #[test]
    fn provider_builds_from_base64_key() {
        let config = EncryptionConfig {
            key: STANDARD.encode([1u8; 32]),
        };
        assert!(DekProvider::from_config(&config).is_ok());
    }

    #[test]
    fn provider_rejects_short_key() {
        let config = EncryptionConfig {
            key: STANDARD.encode([1u8; 16]),
        };
        assert!(DekProvider::from_config(&config).is_err());
    }

    #[test]
    fn provider_rejects_garbage() {
        let config = EncryptionConfig {
            key: "not base64 !!!".into(),
        };
        assert!(DekProvider::from_config(&config).is_err());
    }
}
