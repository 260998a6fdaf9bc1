use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::Identity,
    models::{CreateTransfer, OwnershipTransfer, TransferStatus},
    services::error::{CoreError, CoreResult},
    store::{StorePool, TransferRow, truncate_to_millis},
};

/// The ownership-transfer state machine.
#[derive(Clone)]
pub struct TransferService {
    store: Arc<StorePool>,
}

impl TransferService {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }

    fn row_to_transfer(row: &TransferRow) -> OwnershipTransfer {
        OwnershipTransfer {
            id: row.id,
            conversation_group_id: row.conversation_group_id,
            from_user_id: row.from_user_id.clone(),
            to_user_id: row.to_user_id.clone(),
            status: row.status,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        }
    }

    /// Create a pending transfer. Only the current owner may initiate;
    /// the recipient must already be a member. A duplicate pending
    /// transfer conflicts and names the existing one.
    pub async fn create(
        &self,
        identity: &Identity,
        input: CreateTransfer,
    ) -> CoreResult<OwnershipTransfer> {
        let group = self
            .store
            .groups()
            .get_by_id(input.conversation_group_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation group"))?;
        if group.is_deleted() {
            return Err(CoreError::not_found("conversation group"));
        }
        if group.owner_user_id != identity.user_id {
            return Err(CoreError::AccessDenied(
                "only the owner can transfer ownership".to_string(),
            ));
        }
        if input.new_owner_user_id == identity.user_id {
            return Err(CoreError::Validation(
                "cannot transfer ownership to yourself".to_string(),
            ));
        }
        let member = self
            .store
            .memberships()
            .get(group.id, &input.new_owner_user_id)
            .await?;
        if member.is_none() {
            return Err(CoreError::Validation(
                "the new owner must already be a member of the group".to_string(),
            ));
        }

        let row = TransferRow {
            id: Uuid::new_v4(),
            conversation_group_id: group.id,
            from_user_id: identity.user_id.clone(),
            to_user_id: input.new_owner_user_id.clone(),
            status: TransferStatus::Pending,
            created_at: truncate_to_millis(Utc::now()),
            resolved_at: None,
        };

        match self.store.transfers().create(&row).await {
            Ok(()) => Ok(Self::row_to_transfer(&row)),
            Err(crate::store::StoreError::UniqueViolation(_)) => {
                let existing = self.store.transfers().find_pending(group.id).await?;
                Err(CoreError::Conflict {
                    message: "a pending transfer already exists for this group".to_string(),
                    details: existing.map(|t| {
                        serde_json::json!({ "existingTransferId": t.id })
                    }),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, identity: &Identity, id: Uuid) -> CoreResult<OwnershipTransfer> {
        let row = self
            .store
            .transfers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("ownership transfer"))?;
        if row.from_user_id != identity.user_id
            && row.to_user_id != identity.user_id
            && !identity.is_auditor()
        {
            return Err(CoreError::not_found("ownership transfer"));
        }
        Ok(Self::row_to_transfer(&row))
    }

    pub async fn list(&self, identity: &Identity) -> CoreResult<Vec<OwnershipTransfer>> {
        let rows = self
            .store
            .transfers()
            .list_for_user(&identity.user_id)
            .await?;
        Ok(rows.iter().map(Self::row_to_transfer).collect())
    }

    /// Accept a pending transfer; only the recipient may accept. The
    /// store swaps owner and downgrades the sender in one transaction.
    pub async fn accept(&self, identity: &Identity, id: Uuid) -> CoreResult<OwnershipTransfer> {
        let row = self
            .store
            .transfers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("ownership transfer"))?;
        if row.to_user_id != identity.user_id {
            return Err(CoreError::AccessDenied(
                "only the recipient can accept a transfer".to_string(),
            ));
        }
        let accepted = self
            .store
            .transfers()
            .accept(id, truncate_to_millis(Utc::now()))
            .await?;
        Ok(Self::row_to_transfer(&accepted))
    }

    /// Cancel a pending transfer; sender or recipient may cancel.
    pub async fn cancel(&self, identity: &Identity, id: Uuid) -> CoreResult<()> {
        let row = self
            .store
            .transfers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("ownership transfer"))?;
        if row.from_user_id != identity.user_id && row.to_user_id != identity.user_id {
            return Err(CoreError::AccessDenied(
                "only the sender or recipient can cancel a transfer".to_string(),
            ));
        }
        let cancelled = self
            .store
            .transfers()
            .cancel(id, truncate_to_millis(Utc::now()))
            .await?;
        if !cancelled {
            return Err(CoreError::conflict("transfer is no longer pending"));
        }
        Ok(())
    }
}
