//! Opaque cursor pagination.
//!
//! Listings paginate with keyset cursors over `(created_at, id)` (entries)
//! or `(updated_at, id)` (conversations). Cursors are URL-safe base64 and
//! opaque to clients; the same cursor yields the same page under
//! concurrent modification because the sort key is immutable for the rows
//! it orders.
//!
//! Cursors encode timestamps at millisecond precision, so entities must
//! truncate their timestamps with [`truncate_to_millis`] at creation time.
//! Without that, the cursor's decoded timestamp won't compare equal to
//! the stored value on backends that store timestamps as text.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("invalid cursor format")]
    InvalidFormat,
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid timestamp in cursor")]
    InvalidTimestamp,
    #[error("invalid UUID in cursor")]
    InvalidUuid,
}

/// A position in an ordered result set: a timestamp plus an id tiebreak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// Encode as URL-safe base64 of `{timestamp_millis}:{uuid}`.
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.created_at.timestamp_millis(), self.id);
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
        let raw = String::from_utf8(bytes).map_err(|_| CursorError::InvalidFormat)?;

        // UUIDs use hyphens, so ':' cleanly separates the two parts.
        let (timestamp_str, uuid_str) = raw.split_once(':').ok_or(CursorError::InvalidFormat)?;

        let timestamp_millis: i64 = timestamp_str
            .parse()
            .map_err(|_| CursorError::InvalidTimestamp)?;
        let created_at = DateTime::from_timestamp_millis(timestamp_millis)
            .ok_or(CursorError::InvalidTimestamp)?;
        let id = Uuid::parse_str(uuid_str).map_err(|_| CursorError::InvalidUuid)?;

        Ok(Self { created_at, id })
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl Serialize for Cursor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Cursor::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Pagination parameters for list queries.
///
/// Each listing has a fixed sort: entries ascend by `(created_at, id)`,
/// conversations descend by `(updated_at, id)`.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub limit: Option<i64>,
    /// Resume after this position.
    pub after: Option<Cursor>,
}

/// Result of a paginated list query.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// Cursor for the next page, when more items exist.
    pub next: Option<Cursor>,
}

impl<T> ListResult<T> {
    pub fn new(items: Vec<T>, has_more: bool, next: Option<Cursor>) -> Self {
        Self {
            items,
            has_more,
            next,
        }
    }

    /// Build a page from over-fetched rows: callers fetch `limit + 1` rows
    /// to detect whether another page exists.
    pub fn from_overfetch<F>(mut rows: Vec<T>, limit: i64, cursor_of: F) -> Self
    where
        F: Fn(&T) -> Cursor,
    {
        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit as usize);
        let next = if has_more {
            rows.last().map(&cursor_of)
        } else {
            None
        };
        Self::new(rows, has_more, next)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> ListResult<U> {
        ListResult {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next: self.next,
        }
    }
}

/// Truncate a timestamp to millisecond precision, matching cursor
/// encoding precision.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let cursor = Cursor::new(truncate_to_millis(Utc::now()), Uuid::new_v4());
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn encoding_is_url_safe() {
        let encoded = Cursor::new(Utc::now(), Uuid::new_v4()).encode();
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Cursor::decode("not valid base64!!!").is_err());
        let no_colon = URL_SAFE_NO_PAD.encode(b"justonepart");
        assert!(matches!(
            Cursor::decode(&no_colon),
            Err(CursorError::InvalidFormat)
        ));
        let bad_ts = URL_SAFE_NO_PAD.encode(b"abc:00000000-0000-0000-0000-000000000000");
        assert!(matches!(
            Cursor::decode(&bad_ts),
            Err(CursorError::InvalidTimestamp)
        ));
        let bad_uuid = URL_SAFE_NO_PAD.encode(b"123456:nope");
        assert!(matches!(
            Cursor::decode(&bad_uuid),
            Err(CursorError::InvalidUuid)
        ));
    }

    #[test]
    fn overfetch_produces_next_cursor() {
        let rows: Vec<(DateTime<Utc>, Uuid)> = (0..4)
            .map(|i| {
                (
                    DateTime::from_timestamp_millis(1_000 * i).unwrap(),
                    Uuid::new_v4(),
                )
            })
            .collect();
        let last_kept = rows[2];

        let page = ListResult::from_overfetch(rows, 3, |(ts, id)| Cursor::new(*ts, *id));
        assert_eq!(page.items.len(), 3);
        assert!(page.has_more);
        assert_eq!(page.next.as_ref().unwrap().id, last_kept.1);
    }

    #[test]
    fn overfetch_without_extra_row_ends_pagination() {
        let rows = vec![(Utc::now(), Uuid::new_v4())];
        let page = ListResult::from_overfetch(rows, 3, |(ts, id)| Cursor::new(*ts, *id));
        assert!(!page.has_more);
        assert!(page.next.is_none());
    }
}
