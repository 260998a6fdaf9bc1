use std::sync::Arc;

use crate::{
    auth::Identity,
    models::AccessLevel,
    services::error::{CoreError, CoreResult},
    store::{GroupRow, StorePool},
};

/// How a caller's access to a group was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    /// Through a live membership (or group ownership).
    Membership(AccessLevel),
    /// Admin override. Bypasses membership; audit-logged by the caller.
    AdminOverride,
}

/// Resolves caller access at the conversation-group level.
///
/// The 404-vs-403 rule: a caller with no visibility into a group gets
/// NotFound; a caller with some access but insufficient level for the
/// action gets AccessDenied.
#[derive(Clone)]
pub struct AccessService {
    store: Arc<StorePool>,
}

impl AccessService {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }

    /// The highest level the caller holds on the group via membership or
    /// ownership, ignoring admin override.
    pub async fn effective_level(
        &self,
        identity: &Identity,
        group: &GroupRow,
    ) -> CoreResult<Option<AccessLevel>> {
        // The owner column is authoritative even if the membership row is
        // missing or stale.
        if group.owner_user_id == identity.user_id {
            return Ok(Some(AccessLevel::Owner));
        }
        let membership = self
            .store
            .memberships()
            .get(group.id, &identity.user_id)
            .await?;
        Ok(membership.map(|m| m.access_level))
    }

    /// Require at least `min` on the group for an agent-API operation.
    ///
    /// Soft-deleted groups are invisible here regardless of membership;
    /// admin callers go through [`Self::require_admin_visible`] instead.
    pub async fn require(
        &self,
        identity: &Identity,
        group: &GroupRow,
        min: AccessLevel,
    ) -> CoreResult<AccessGrant> {
        // Admins bypass membership outright; auditors bypass for reads.
        if identity.is_admin() || (identity.is_auditor() && min == AccessLevel::Reader) {
            tracing::info!(
                target: "audit",
                user_id = %identity.user_id,
                group_id = %group.id,
                required = min.as_str(),
                "role-based membership override"
            );
            return Ok(AccessGrant::AdminOverride);
        }

        if group.is_deleted() {
            return Err(CoreError::not_found("conversation"));
        }

        match self.effective_level(identity, group).await? {
            None => Err(CoreError::not_found("conversation")),
            Some(level) if level >= min => Ok(AccessGrant::Membership(level)),
            Some(_) => Err(CoreError::AccessDenied(format!(
                "requires {} access",
                min.as_str()
            ))),
        }
    }

    /// Admin/auditor visibility check for soft-deleted resources.
    pub fn require_admin_visible(&self, identity: &Identity) -> CoreResult<()> {
        if identity.is_auditor() {
            Ok(())
        } else {
            Err(CoreError::AccessDenied("requires auditor role".to_string()))
        }
    }
}
