use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::Identity,
    crypto::{DekProvider, FieldId},
    models::{
        AccessLevel, AdminGroupFilter, Channel, Conversation, ConversationWithTitle,
        CreateConversation, CreateFork, UpdateConversationGroup, validators,
    },
    services::{
        access::AccessService,
        error::{CoreError, CoreResult},
    },
    store::{
        ConversationRow, GroupRow, ListParams, ListResult, StorePool, truncate_to_millis,
    },
};

/// Conversation and group lifecycle: create, list, update, fork,
/// soft-delete, restore.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<StorePool>,
    crypto: DekProvider,
    access: AccessService,
}

impl ConversationService {
    pub fn new(store: Arc<StorePool>, crypto: DekProvider, access: AccessService) -> Self {
        Self {
            store,
            crypto,
            access,
        }
    }

    // ==================== Conversion ====================

    fn row_to_conversation(row: &ConversationRow) -> Conversation {
        Conversation {
            id: row.id,
            conversation_group_id: row.conversation_group_id,
            forked_at_conversation_id: row.forked_at_conversation_id,
            forked_at_entry_id: row.forked_at_entry_id,
            metadata: row.metadata.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }

    pub(crate) fn decrypt_title(&self, group: &GroupRow) -> CoreResult<Option<String>> {
        group
            .title
            .as_deref()
            .map(|sealed| {
                self.crypto
                    .envelope()
                    .open_str(FieldId::GroupTitle, sealed)
                    .map_err(CoreError::from)
            })
            .transpose()
    }

    async fn load_group_for(&self, conversation: &ConversationRow) -> CoreResult<GroupRow> {
        self.store
            .groups()
            .get_by_id(conversation.conversation_group_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))
    }

    // ==================== Create / get / list ====================

    /// Create a conversation. The enclosing group is created with the
    /// caller as owner and an owner membership.
    pub async fn create(
        &self,
        identity: &Identity,
        input: CreateConversation,
    ) -> CoreResult<ConversationWithTitle> {
        let now = truncate_to_millis(Utc::now());
        let group_id = Uuid::new_v4();

        let title = input
            .title
            .as_deref()
            .map(|t| self.crypto.envelope().seal_str(FieldId::GroupTitle, t))
            .transpose()?;

        let group = GroupRow {
            id: group_id,
            owner_user_id: identity.user_id.clone(),
            title,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store.groups().create(&group).await?;
        self.store
            .memberships()
            .upsert(group_id, &identity.user_id, AccessLevel::Owner, now)
            .await?;

        let conversation = ConversationRow {
            id: Uuid::new_v4(),
            conversation_group_id: group_id,
            forked_at_conversation_id: None,
            forked_at_entry_id: None,
            metadata: input.metadata.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store.conversations().create(&conversation).await?;

        Ok(ConversationWithTitle {
            conversation: Self::row_to_conversation(&conversation),
            title: input.title,
        })
    }

    pub async fn get(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
    ) -> CoreResult<ConversationWithTitle> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() && !identity.is_admin() {
            return Err(CoreError::not_found("conversation"));
        }
        let group = self.load_group_for(&conversation).await?;
        self.access
            .require(identity, &group, AccessLevel::Reader)
            .await?;
        Ok(ConversationWithTitle {
            conversation: Self::row_to_conversation(&conversation),
            title: self.decrypt_title(&group)?,
        })
    }

    pub async fn list(
        &self,
        identity: &Identity,
        params: ListParams,
    ) -> CoreResult<ListResult<ConversationWithTitle>> {
        let rows = self
            .store
            .conversations()
            .list_for_user(&identity.user_id, &params)
            .await?;

        // Hydrate titles per distinct group.
        let mut titles: HashMap<Uuid, Option<String>> = HashMap::new();
        for row in &rows.items {
            if let std::collections::hash_map::Entry::Vacant(slot) =
                titles.entry(row.conversation_group_id)
            {
                let group = self
                    .store
                    .groups()
                    .get_by_id(row.conversation_group_id)
                    .await?;
                let title = match &group {
                    Some(g) => self.decrypt_title(g)?,
                    None => None,
                };
                slot.insert(title);
            }
        }

        Ok(rows.map(|row| {
            let title = titles
                .get(&row.conversation_group_id)
                .cloned()
                .unwrap_or_default();
            ConversationWithTitle {
                conversation: Self::row_to_conversation(&row),
                title,
            }
        }))
    }

    // ==================== Update / delete / restore ====================

    pub async fn update(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        input: UpdateConversationGroup,
        conversation_metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> CoreResult<ConversationWithTitle> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() {
            return Err(CoreError::not_found("conversation"));
        }
        let group = self.load_group_for(&conversation).await?;
        self.access
            .require(identity, &group, AccessLevel::Writer)
            .await?;

        let sealed_title = input
            .title
            .as_deref()
            .map(|t| self.crypto.envelope().seal_str(FieldId::GroupTitle, t))
            .transpose()?;
        if sealed_title.is_some() || input.metadata.is_some() {
            self.store
                .groups()
                .update(
                    group.id,
                    sealed_title.as_deref(),
                    input.metadata.as_ref(),
                )
                .await?;
        }

        let now = truncate_to_millis(Utc::now());
        if let Some(metadata) = &conversation_metadata {
            validators::validate_metadata(metadata)
                .map_err(|e| CoreError::Validation(e.to_string()))?;
            self.store
                .conversations()
                .update_metadata(conversation_id, metadata, now)
                .await?;
        }

        self.get(identity, conversation_id).await
    }

    /// Soft-delete the group enclosing the conversation.
    pub async fn soft_delete(&self, identity: &Identity, conversation_id: Uuid) -> CoreResult<()> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() {
            return Err(CoreError::not_found("conversation"));
        }
        let group = self.load_group_for(&conversation).await?;
        self.access
            .require(identity, &group, AccessLevel::Manager)
            .await?;

        self.store
            .groups()
            .soft_delete(group.id, truncate_to_millis(Utc::now()))
            .await?;
        Ok(())
    }

    /// Restore a soft-deleted group (admin surface).
    pub async fn restore(&self, identity: &Identity, conversation_id: Uuid) -> CoreResult<()> {
        if !identity.is_admin() {
            return Err(CoreError::AccessDenied("requires admin role".to_string()));
        }
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        tracing::info!(
            target: "audit",
            user_id = %identity.user_id,
            group_id = %conversation.conversation_group_id,
            "admin restore"
        );
        self.store
            .groups()
            .restore(conversation.conversation_group_id)
            .await?;
        Ok(())
    }

    // ==================== Forks ====================

    /// Fork a conversation before the given entry. Only HISTORY entries
    /// originating from a user are valid fork points.
    pub async fn create_fork(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        input: CreateFork,
    ) -> CoreResult<Conversation> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() {
            return Err(CoreError::not_found("conversation"));
        }
        let group = self.load_group_for(&conversation).await?;
        self.access
            .require(identity, &group, AccessLevel::Writer)
            .await?;

        let entry = self
            .store
            .entries()
            .get_by_id(group.id, input.entry_id)
            .await?
            .ok_or_else(|| CoreError::not_found("entry"))?;
        if entry.channel != Channel::History.as_str() {
            return Err(CoreError::Precondition(
                "forks are only permitted at HISTORY entries".to_string(),
            ));
        }
        if entry.client_id.is_some() {
            return Err(CoreError::Precondition(
                "forks are only permitted at user-originated entries".to_string(),
            ));
        }

        let now = truncate_to_millis(Utc::now());
        let fork = ConversationRow {
            id: Uuid::new_v4(),
            conversation_group_id: group.id,
            forked_at_conversation_id: Some(entry.conversation_id),
            forked_at_entry_id: Some(entry.id),
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.store.conversations().create(&fork).await?;
        Ok(Self::row_to_conversation(&fork))
    }

    /// All conversations of the group that carry a fork pointer.
    pub async fn list_forks(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
    ) -> CoreResult<Vec<Conversation>> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() {
            return Err(CoreError::not_found("conversation"));
        }
        let group = self.load_group_for(&conversation).await?;
        self.access
            .require(identity, &group, AccessLevel::Reader)
            .await?;

        let rows = self
            .store
            .conversations()
            .list_by_group(group.id, false)
            .await?;
        Ok(rows
            .iter()
            .filter(|c| c.is_fork())
            .map(Self::row_to_conversation)
            .collect())
    }

    // ==================== Admin surface ====================

    pub async fn admin_list(
        &self,
        identity: &Identity,
        filter: &AdminGroupFilter,
        params: &ListParams,
    ) -> CoreResult<ListResult<(GroupRow, Option<String>)>> {
        self.access.require_admin_visible(identity)?;
        if (filter.include_deleted || filter.only_deleted) && !identity.is_auditor() {
            return Err(CoreError::AccessDenied("requires auditor role".to_string()));
        }
        let rows = self.store.groups().list_admin(filter, params).await?;
        let mut out = Vec::with_capacity(rows.items.len());
        for group in rows.items {
            let title = self.decrypt_title(&group)?;
            out.push((group, title));
        }
        Ok(ListResult::new(out, rows.has_more, rows.next))
    }

    pub async fn admin_get(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
    ) -> CoreResult<(ConversationWithTitle, GroupRow)> {
        self.access.require_admin_visible(identity)?;
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        let group = self.load_group_for(&conversation).await?;
        let title = self.decrypt_title(&group)?;
        Ok((
            ConversationWithTitle {
                conversation: Self::row_to_conversation(&conversation),
                title,
            },
            group,
        ))
    }

    /// Admin soft-delete bypasses membership but is audit-logged.
    pub async fn admin_soft_delete(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
    ) -> CoreResult<()> {
        if !identity.is_admin() {
            return Err(CoreError::AccessDenied("requires admin role".to_string()));
        }
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        tracing::info!(
            target: "audit",
            user_id = %identity.user_id,
            group_id = %conversation.conversation_group_id,
            "admin soft-delete"
        );
        self.store
            .groups()
            .soft_delete(
                conversation.conversation_group_id,
                truncate_to_millis(Utc::now()),
            )
            .await?;
        Ok(())
    }
}
