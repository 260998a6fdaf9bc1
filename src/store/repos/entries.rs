use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ListParams, ListResult};
use crate::store::error::StoreResult;

/// An entry row. The content column holds the encryption envelope;
/// `indexed_content` is plaintext by design (it feeds the search index).
#[derive(Debug, Clone)]
pub struct EntryRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_group_id: Uuid,
    pub channel: String,
    pub client_id: Option<String>,
    pub content_type: String,
    pub content: Vec<u8>,
    pub indexed_content: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub epoch: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait EntryRepo: Send + Sync {
    /// Insert an entry. Entries are immutable after this point.
    async fn insert(&self, row: &EntryRow) -> StoreResult<()>;

    /// Get one entry. The group id is required so partitioned backends
    /// can prune to a single partition.
    async fn get_by_id(&self, group_id: Uuid, id: Uuid) -> StoreResult<Option<EntryRow>>;

    /// All entries of one conversation ordered by `(created_at, id)`.
    /// Channel filtering happens after fork-ancestry assembly, never here.
    async fn list_by_conversation(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
    ) -> StoreResult<Vec<EntryRow>>;

    /// All entries in a group ordered by `(created_at, id)`. Drives
    /// `forks=all` listing.
    async fn list_by_group(&self, group_id: Uuid) -> StoreResult<Vec<EntryRow>>;

    /// MEMORY entries for (conversation, client), ordered by
    /// `(epoch, created_at, id)`.
    async fn list_memory(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        client_id: &str,
    ) -> StoreResult<Vec<EntryRow>>;

    /// Backfill `indexed_content` on an entry (batch index submission).
    /// Resets `indexed_at`: the new text awaits indexing.
    async fn set_indexed_content(
        &self,
        group_id: Uuid,
        entry_id: Uuid,
        text: &str,
    ) -> StoreResult<()>;

    /// Stamp vector-index completion on an entry.
    async fn set_indexed_at(
        &self,
        group_id: Uuid,
        entry_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// HISTORY entries with no `indexed_content`, cursor-paginated by
    /// `created_at`. Backs the unindexed-discovery endpoint.
    async fn list_missing_indexed_content(
        &self,
        params: &ListParams,
    ) -> StoreResult<ListResult<EntryRow>>;

    /// Entries with `indexed_content` present but `indexed_at` null:
    /// the work list of the index-retry task.
    async fn list_pending_index(&self, limit: i64) -> StoreResult<Vec<EntryRow>>;
}
