use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Attachment policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentsConfig {
    /// Maximum attachment payload size in bytes.
    #[serde(default = "default_max_size")]
    pub max_size_bytes: u64,

    /// TTL for unlinked attachments when the caller gives none.
    #[serde(default = "default_expires_in")]
    pub default_expires_in_secs: u64,

    /// Upper bound on caller-supplied `expiresIn`.
    #[serde(default = "default_max_expires_in")]
    pub max_expires_in_secs: u64,

    /// Directory for the filesystem blob store.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,

    /// HMAC secret for signing download tokens.
    #[serde(default)]
    pub download_token_secret: Option<String>,

    /// Lifetime of signed download tokens, in seconds.
    #[serde(default = "default_download_token_ttl")]
    pub download_token_ttl_secs: u64,

    /// How often the TTL cleanup pass runs, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size(),
            default_expires_in_secs: default_expires_in(),
            max_expires_in_secs: default_max_expires_in(),
            blob_dir: default_blob_dir(),
            download_token_secret: None,
            download_token_ttl_secs: default_download_token_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl AttachmentsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Validation(
                "attachments.max_size_bytes must be positive".into(),
            ));
        }
        if self.default_expires_in_secs > self.max_expires_in_secs {
            return Err(ConfigError::Validation(
                "attachments.default_expires_in_secs cannot exceed max_expires_in_secs".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_size() -> u64 {
    50 * 1024 * 1024
}

fn default_expires_in() -> u64 {
    3600
}

fn default_max_expires_in() -> u64 {
    24 * 3600
}

fn default_blob_dir() -> String {
    "./data/blobs".to_string()
}

fn default_download_token_ttl() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    300
}
