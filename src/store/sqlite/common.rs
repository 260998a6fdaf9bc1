use serde_json::Map;
use uuid::Uuid;

use crate::store::error::{StoreError, StoreResult};

/// Parse a UUID string from the database, returning a StoreError on failure.
pub fn parse_uuid(s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Parse an optional UUID column.
pub fn parse_opt_uuid(s: Option<String>) -> StoreResult<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

/// Parse a metadata JSON object column.
pub fn parse_metadata(s: &str) -> StoreResult<Map<String, serde_json::Value>> {
    serde_json::from_str(s).map_err(|e| StoreError::Internal(e.to_string()))
}

/// Parse an enum-like TEXT column through FromStr.
pub fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> StoreResult<T> {
    s.parse().map_err(StoreError::Internal)
}

/// Build a `?, ?, ...` placeholder list for IN clauses.
pub fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}
