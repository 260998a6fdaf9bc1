use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use uuid::Uuid;

use super::{ListParams, ListResult};
use crate::{models::AdminGroupFilter, store::error::StoreResult};

/// A conversation-group row. The title column holds the encryption
/// envelope; decryption happens in the service layer.
#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: Uuid,
    pub owner_user_id: String,
    pub title: Option<Vec<u8>>,
    pub metadata: Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl GroupRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[async_trait]
pub trait GroupRepo: Send + Sync {
    /// Insert a new group row.
    async fn create(&self, row: &GroupRow) -> StoreResult<()>;

    /// Get a group regardless of soft-delete state.
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<GroupRow>>;

    /// Set the derived title only if no title is present. Returns whether
    /// the row was updated. Used by write-time title materialization so a
    /// concurrent explicit override wins.
    async fn set_title_if_unset(&self, id: Uuid, title: &[u8]) -> StoreResult<bool>;

    /// Update title and/or metadata. Fails with NotFound if absent.
    async fn update(
        &self,
        id: Uuid,
        title: Option<&[u8]>,
        metadata: Option<&Map<String, serde_json::Value>>,
    ) -> StoreResult<()>;

    /// Soft-delete the group and cascade to its conversations, all in one
    /// transaction. Memberships are hard-deleted (they are access control,
    /// not content) and pending ownership transfers removed.
    /// Fails with NotFound if the group is absent or already deleted.
    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Restore a soft-deleted group and its conversations.
    /// Fails with Conflict if the group is already active.
    async fn restore(&self, id: Uuid) -> StoreResult<()>;

    /// Admin cross-user listing with soft-delete filters.
    async fn list_admin(
        &self,
        filter: &AdminGroupFilter,
        params: &ListParams,
    ) -> StoreResult<ListResult<GroupRow>>;

    /// Count groups eligible for eviction (soft-deleted before cutoff).
    async fn count_evictable(&self, cutoff: DateTime<Utc>) -> StoreResult<i64>;

    /// Claim and hard-delete one batch of evictable groups.
    ///
    /// In a single transaction: select up to `limit` ids with
    /// `deleted_at < cutoff` using skip-locked semantics, enqueue one
    /// `vector_store_delete` task per group into the task table, then
    /// hard-delete the rows (children cascade). Returns the deleted ids.
    /// Safe to call concurrently: batches are disjoint.
    async fn evict_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Uuid>>;
}
