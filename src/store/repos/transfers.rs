use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{models::TransferStatus, store::error::StoreResult};

/// An ownership-transfer row.
#[derive(Debug, Clone)]
pub struct TransferRow {
    pub id: Uuid,
    pub conversation_group_id: Uuid,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TransferRepo: Send + Sync {
    /// Insert a pending transfer. Fails with UniqueViolation when the
    /// group already has a pending transfer.
    async fn create(&self, row: &TransferRow) -> StoreResult<()>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<TransferRow>>;

    /// The pending transfer for a group, if any.
    async fn find_pending(&self, group_id: Uuid) -> StoreResult<Option<TransferRow>>;

    /// Transfers where the user is sender or recipient, newest first.
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<TransferRow>>;

    /// Cancel a pending transfer. Returns false if it was not pending.
    async fn cancel(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Accept a pending transfer: in one transaction, mark it accepted,
    /// promote the recipient to owner, downgrade the prior owner to
    /// manager, and update the group's owner column.
    /// Fails with Conflict if the transfer is no longer pending.
    async fn accept(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<TransferRow>;
}
