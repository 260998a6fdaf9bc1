use serde_json::Map;

use crate::store::error::{StoreError, StoreResult};

/// Interpret a JSONB column as a metadata object.
pub fn metadata_from_value(
    value: serde_json::Value,
) -> StoreResult<Map<String, serde_json::Value>> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Internal(format!(
            "expected JSON object in metadata column, got {}",
            other
        ))),
    }
}

/// Parse an enum-like TEXT column through FromStr.
pub fn parse_enum<T: std::str::FromStr<Err = String>>(s: &str) -> StoreResult<T> {
    s.parse().map_err(StoreError::Internal)
}
