//! Field-level constraints shared by the Agent and Admin APIs.
//!
//! These bounds are enforced at the request boundary (via `validator`
//! derive attributes) and re-checked in the service layer for paths that
//! bypass HTTP (batch indexing, internal callers).

use serde_json::Map;
use validator::ValidationError;

/// Maximum length of a conversation group title.
pub const MAX_TITLE_CHARS: usize = 500;

/// Maximum length of an entry content type.
pub const MAX_CONTENT_TYPE_CHARS: usize = 127;

/// Maximum length of the plaintext `indexed_content` of an entry.
pub const MAX_INDEXED_CONTENT_CHARS: usize = 100_000;

/// Maximum number of metadata keys.
pub const MAX_METADATA_KEYS: usize = 50;

/// Maximum total serialized metadata size in bytes.
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

/// Maximum length of user and client identifiers.
pub const MAX_ID_CHARS: usize = 255;

/// Maximum length of a search query.
pub const MAX_QUERY_CHARS: usize = 1_000;

/// Maximum page size on Agent API listings.
pub const MAX_AGENT_LIST_LIMIT: i64 = 200;

/// Maximum page size on Admin API listings.
pub const MAX_ADMIN_LIST_LIMIT: i64 = 1_000;

/// Validate a metadata object against the key-count and total-size bounds.
pub fn validate_metadata(metadata: &Map<String, serde_json::Value>) -> Result<(), ValidationError> {
    if metadata.len() > MAX_METADATA_KEYS {
        let mut err = ValidationError::new("metadata_too_many_keys");
        err.message = Some(format!("metadata exceeds {} keys", MAX_METADATA_KEYS).into());
        return Err(err);
    }
    let serialized = serde_json::to_vec(metadata).map_err(|_| {
        let mut err = ValidationError::new("metadata_not_serializable");
        err.message = Some("metadata is not serializable".into());
        err
    })?;
    if serialized.len() > MAX_METADATA_BYTES {
        let mut err = ValidationError::new("metadata_too_large");
        err.message = Some(format!("metadata exceeds {} bytes", MAX_METADATA_BYTES).into());
        return Err(err);
    }
    Ok(())
}

/// Clamp a requested page limit to the given ceiling, defaulting when absent.
pub fn clamp_limit(requested: Option<i64>, ceiling: i64) -> i64 {
    match requested {
        Some(n) if n > 0 => n.min(ceiling),
        _ => 50.min(ceiling),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_within_bounds_passes() {
        let mut metadata = Map::new();
        metadata.insert("key".into(), serde_json::json!("value"));
        assert!(validate_metadata(&metadata).is_ok());
    }

    #[test]
    fn metadata_too_many_keys_rejected() {
        let mut metadata = Map::new();
        for i in 0..=MAX_METADATA_KEYS {
            metadata.insert(format!("key-{}", i), serde_json::json!(i));
        }
        assert!(validate_metadata(&metadata).is_err());
    }

    #[test]
    fn metadata_too_large_rejected() {
        let mut metadata = Map::new();
        metadata.insert("blob".into(), serde_json::json!("x".repeat(MAX_METADATA_BYTES)));
        assert!(validate_metadata(&metadata).is_err());
    }

    #[test]
    fn clamp_limit_defaults_and_caps() {
        assert_eq!(clamp_limit(None, MAX_AGENT_LIST_LIMIT), 50);
        assert_eq!(clamp_limit(Some(0), MAX_AGENT_LIST_LIMIT), 50);
        assert_eq!(clamp_limit(Some(500), MAX_AGENT_LIST_LIMIT), 200);
        assert_eq!(clamp_limit(Some(10), MAX_AGENT_LIST_LIMIT), 10);
    }
}
