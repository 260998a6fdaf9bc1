use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{models::AttachmentStatus, store::error::StoreResult};

/// An attachment metadata row.
#[derive(Debug, Clone)]
pub struct AttachmentRow {
    pub id: Uuid,
    pub entry_id: Option<Uuid>,
    pub status: AttachmentStatus,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub sha256: Option<String>,
    pub storage_key: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    async fn create(&self, row: &AttachmentRow) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<AttachmentRow>>;

    /// Move an attachment to `ready` with its payload facts filled in.
    async fn mark_ready(
        &self,
        id: Uuid,
        size_bytes: i64,
        sha256: &str,
        storage_key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Mark a URL-ingest attachment as failed.
    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Link a ready attachment to an entry and clear its TTL.
    /// Fails with Conflict if it is already linked.
    async fn link(&self, id: Uuid, entry_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Delete the metadata row. Returns the row for blob cleanup.
    async fn delete(&self, id: Uuid) -> StoreResult<Option<AttachmentRow>>;

    /// Unlinked attachments whose TTL expired before the cutoff.
    async fn list_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<AttachmentRow>>;
}
