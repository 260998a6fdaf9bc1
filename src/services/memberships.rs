use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::Identity,
    models::{AccessLevel, ConversationMembership, UpsertMembership},
    services::{
        access::AccessService,
        error::{CoreError, CoreResult},
    },
    store::{MembershipRow, StorePool, truncate_to_millis},
};

/// Membership CRUD with access-level gating: managers may grant WRITER or
/// READER; only the owner (through ownership transfer) changes OWNER.
#[derive(Clone)]
pub struct MembershipService {
    store: Arc<StorePool>,
    access: AccessService,
}

impl MembershipService {
    pub fn new(store: Arc<StorePool>, access: AccessService) -> Self {
        Self { store, access }
    }

    fn row_to_membership(row: &MembershipRow) -> ConversationMembership {
        ConversationMembership {
            conversation_group_id: row.conversation_group_id,
            user_id: row.user_id.clone(),
            access_level: row.access_level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    async fn load_group(&self, conversation_id: Uuid) -> CoreResult<crate::store::GroupRow> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() {
            return Err(CoreError::not_found("conversation"));
        }
        self.store
            .groups()
            .get_by_id(conversation.conversation_group_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))
    }

    pub async fn list(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
    ) -> CoreResult<Vec<ConversationMembership>> {
        let group = self.load_group(conversation_id).await?;
        self.access
            .require(identity, &group, AccessLevel::Reader)
            .await?;
        let rows = self.store.memberships().list_by_group(group.id).await?;
        Ok(rows.iter().map(Self::row_to_membership).collect())
    }

    pub async fn upsert(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        input: UpsertMembership,
    ) -> CoreResult<ConversationMembership> {
        let group = self.load_group(conversation_id).await?;
        self.access
            .require(identity, &group, AccessLevel::Manager)
            .await?;
        let caller_level = self
            .access
            .effective_level(identity, &group)
            .await?
            .unwrap_or(AccessLevel::Owner); // admin override path

        if input.access_level == AccessLevel::Owner {
            return Err(CoreError::Validation(
                "the owner changes only through an ownership transfer".to_string(),
            ));
        }
        // Managers grant up to WRITER; the owner also grants MANAGER.
        let ceiling = if caller_level == AccessLevel::Owner || identity.is_admin() {
            AccessLevel::Manager
        } else {
            AccessLevel::Writer
        };
        if input.access_level > ceiling {
            return Err(CoreError::AccessDenied(format!(
                "cannot grant {} access",
                input.access_level.as_str()
            )));
        }
        if input.user_id == group.owner_user_id {
            return Err(CoreError::Validation(
                "the owner's membership cannot be changed".to_string(),
            ));
        }

        let now = truncate_to_millis(Utc::now());
        self.store
            .memberships()
            .upsert(group.id, &input.user_id, input.access_level, now)
            .await?;
        let row = self
            .store
            .memberships()
            .get(group.id, &input.user_id)
            .await?
            .ok_or_else(|| CoreError::Storage("membership vanished after upsert".to_string()))?;
        Ok(Self::row_to_membership(&row))
    }

    pub async fn revoke(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        user_id: &str,
    ) -> CoreResult<()> {
        let group = self.load_group(conversation_id).await?;
        self.access
            .require(identity, &group, AccessLevel::Manager)
            .await?;

        if user_id == group.owner_user_id {
            return Err(CoreError::Validation(
                "the owner's membership cannot be revoked".to_string(),
            ));
        }
        let target = self
            .store
            .memberships()
            .get(group.id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("membership"))?;

        // A manager cannot strip a peer manager; the owner (or admin) can.
        let caller_level = self
            .access
            .effective_level(identity, &group)
            .await?
            .unwrap_or(AccessLevel::Owner);
        if target.access_level >= caller_level && !identity.is_admin() {
            return Err(CoreError::AccessDenied(
                "cannot revoke a membership at or above your own level".to_string(),
            ));
        }

        let revoked = self
            .store
            .memberships()
            .revoke(group.id, user_id, truncate_to_millis(Utc::now()))
            .await?;
        if !revoked {
            return Err(CoreError::not_found("membership"));
        }
        Ok(())
    }
}
