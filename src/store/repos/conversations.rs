use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use uuid::Uuid;

use super::{ListParams, ListResult};
use crate::store::error::StoreResult;

/// A conversation row.
#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: Uuid,
    pub conversation_group_id: Uuid,
    pub forked_at_conversation_id: Option<Uuid>,
    pub forked_at_entry_id: Option<Uuid>,
    pub metadata: Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ConversationRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_fork(&self) -> bool {
        self.forked_at_conversation_id.is_some()
    }
}

#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn create(&self, row: &ConversationRow) -> StoreResult<()>;

    /// Get a conversation regardless of soft-delete state.
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<ConversationRow>>;

    /// All conversations in a group, ordered by `(created_at, id)`.
    async fn list_by_group(
        &self,
        group_id: Uuid,
        include_deleted: bool,
    ) -> StoreResult<Vec<ConversationRow>>;

    /// The most recently updated conversation in a group. Drives
    /// `forks=latest` listing.
    async fn latest_in_group(&self, group_id: Uuid) -> StoreResult<Option<ConversationRow>>;

    /// Conversations in groups where the given user holds a membership,
    /// newest-updated first, excluding soft-deleted rows.
    async fn list_for_user(
        &self,
        user_id: &str,
        params: &ListParams,
    ) -> StoreResult<ListResult<ConversationRow>>;

    /// Replace conversation metadata and bump `updated_at`.
    async fn update_metadata(
        &self,
        id: Uuid,
        metadata: &Map<String, serde_json::Value>,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Bump `updated_at`, marking the conversation as recently active.
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
}
