use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{models::AccessLevel, store::error::StoreResult};

/// A membership row. Revoked memberships keep their row with `deleted_at`
/// set until eviction removes them; access checks see only live rows.
#[derive(Debug, Clone)]
pub struct MembershipRow {
    pub conversation_group_id: Uuid,
    pub user_id: String,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait MembershipRepo: Send + Sync {
    /// Insert or update a live membership at the given level. Revives a
    /// previously revoked row.
    async fn upsert(
        &self,
        group_id: Uuid,
        user_id: &str,
        level: AccessLevel,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Get the live membership for (group, user).
    async fn get(&self, group_id: Uuid, user_id: &str) -> StoreResult<Option<MembershipRow>>;

    /// Live memberships of a group.
    async fn list_by_group(&self, group_id: Uuid) -> StoreResult<Vec<MembershipRow>>;

    /// Revoke a membership (soft-delete). Returns false when no live
    /// membership existed.
    async fn revoke(&self, group_id: Uuid, user_id: &str, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Ids of non-deleted groups where the user holds any live
    /// membership. Scopes search queries.
    async fn accessible_group_ids(&self, user_id: &str) -> StoreResult<Vec<Uuid>>;

    /// Count revoked memberships eligible for eviction.
    async fn count_evictable(&self, cutoff: DateTime<Utc>) -> StoreResult<i64>;

    /// Hard-delete one batch of revoked memberships past the cutoff,
    /// with skip-locked claim semantics. Returns rows deleted.
    async fn evict_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> StoreResult<u64>;
}
