use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::Identity,
    crypto::{DekProvider, FieldId},
    models::{
        AppendEntry, Channel, ContentBlock, Entry, FORK_STEP_CONTENT_TYPE, ForkMode, SyncMemory,
        SyncOutcome, validators,
    },
    search::SearchCoordinator,
    services::{
        access::AccessService,
        error::{CoreError, CoreResult},
    },
    store::{
        ConversationRow, Cursor, EntryRow, GroupRow, ListResult, StorePool, truncate_to_millis,
    },
};

/// Query parameters for fork-aware entry listing.
#[derive(Debug, Clone, Default)]
pub struct ListEntriesQuery {
    pub channel: Option<Channel>,
    pub forks: ForkMode,
    pub after: Option<Cursor>,
    pub limit: Option<i64>,
}

/// Entry coordination: append pipeline, fork-aware listing, MEMORY sync.
#[derive(Clone)]
pub struct EntryService {
    store: Arc<StorePool>,
    crypto: DekProvider,
    access: AccessService,
    search: Arc<SearchCoordinator>,
}

impl EntryService {
    pub fn new(
        store: Arc<StorePool>,
        crypto: DekProvider,
        access: AccessService,
        search: Arc<SearchCoordinator>,
    ) -> Self {
        Self {
            store,
            crypto,
            access,
            search,
        }
    }

    // ==================== Row/model conversion ====================

    pub(crate) fn decrypt_entry(&self, row: &EntryRow) -> CoreResult<Entry> {
        let plaintext = self
            .crypto
            .envelope()
            .open(FieldId::EntryContent, &row.content)?;
        let content: Vec<ContentBlock> = serde_json::from_slice(&plaintext)?;
        let channel: Channel = row
            .channel
            .parse()
            .map_err(|e: String| CoreError::Storage(e))?;
        Ok(Entry {
            id: row.id,
            conversation_id: row.conversation_id,
            conversation_group_id: row.conversation_group_id,
            channel,
            client_id: row.client_id.clone(),
            content_type: row.content_type.clone(),
            content,
            indexed_content: row.indexed_content.clone(),
            indexed_at: row.indexed_at,
            epoch: row.epoch,
            created_at: row.created_at,
        })
    }

    fn encrypt_content(&self, content: &[ContentBlock]) -> CoreResult<Vec<u8>> {
        let plaintext = serde_json::to_vec(content)?;
        Ok(self
            .crypto
            .envelope()
            .seal(FieldId::EntryContent, &plaintext)?)
    }

    /// Resolve a conversation plus its group, or NotFound. Soft-deleted
    /// rows surface as NotFound unless `include_deleted` (admin paths).
    pub(crate) async fn load_conversation(
        &self,
        conversation_id: Uuid,
        include_deleted: bool,
    ) -> CoreResult<(ConversationRow, GroupRow)> {
        let conversation = self
            .store
            .conversations()
            .get_by_id(conversation_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if conversation.is_deleted() && !include_deleted {
            return Err(CoreError::not_found("conversation"));
        }
        let group = self
            .store
            .groups()
            .get_by_id(conversation.conversation_group_id)
            .await?
            .ok_or_else(|| CoreError::not_found("conversation"))?;
        if group.is_deleted() && !include_deleted {
            return Err(CoreError::not_found("conversation"));
        }
        Ok((conversation, group))
    }

    // ==================== Append ====================

    pub async fn append(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        input: AppendEntry,
    ) -> CoreResult<Entry> {
        let (conversation, group) = self.load_conversation(conversation_id, false).await?;
        self.access
            .require(identity, &group, crate::models::AccessLevel::Writer)
            .await?;

        if input.channel == Channel::Memory && identity.client_id.is_none() {
            return Err(CoreError::Validation(
                "MEMORY entries require an agent identity (client id)".to_string(),
            ));
        }
        if input.indexed_content.is_some() && input.channel != Channel::History {
            return Err(CoreError::Validation(
                "indexedContent is only accepted on HISTORY entries".to_string(),
            ));
        }
        if input.channel == Channel::History
            && !input
                .content
                .iter()
                .all(|b| matches!(b, ContentBlock::Text { .. }))
        {
            return Err(CoreError::Validation(
                "HISTORY entries carry role-tagged text blocks".to_string(),
            ));
        }

        // Null client id marks a user-originated entry.
        let client_id = identity.client_id.clone();

        let epoch = if input.channel == Channel::Memory {
            let client = identity
                .client_id
                .as_deref()
                .ok_or_else(|| CoreError::Validation("client id required".to_string()))?;
            self.derive_append_epoch(&conversation, &group, client, &input.content)
                .await?
        } else {
            0
        };

        // First HISTORY entry from the owner titles the group, unless an
        // explicit title exists.
        if input.channel == Channel::History
            && client_id.is_none()
            && identity.user_id == group.owner_user_id
            && group.title.is_none()
        {
            let text: String = input
                .content
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n");
            let derived: String = text.chars().take(validators::MAX_TITLE_CHARS).collect();
            if !derived.is_empty() {
                let sealed = self
                    .crypto
                    .envelope()
                    .seal_str(FieldId::GroupTitle, &derived)?;
                self.store
                    .groups()
                    .set_title_if_unset(group.id, &sealed)
                    .await?;
            }
        }

        let now = truncate_to_millis(Utc::now());
        let row = EntryRow {
            id: Uuid::new_v4(),
            conversation_id,
            conversation_group_id: group.id,
            channel: input.channel.as_str().to_string(),
            client_id,
            content_type: input.content_type.clone(),
            content: self.encrypt_content(&input.content)?,
            indexed_content: input.indexed_content.clone(),
            indexed_at: None,
            epoch,
            created_at: now,
        };
        self.store.entries().insert(&row).await?;
        self.store.conversations().touch(conversation_id, now).await?;

        // Transient indexing failures never block the write; the
        // coordinator degrades to "not yet indexed" plus a retry task.
        let mut entry = self.decrypt_entry(&row)?;
        if let Some(text) = &row.indexed_content {
            if let Some(at) = self
                .search
                .index_entry_inline(group.id, conversation_id, row.id, text)
                .await
            {
                entry.indexed_at = Some(at);
            }
        }
        Ok(entry)
    }

    /// Epoch for a directly appended MEMORY entry: the current epoch when
    /// the entry extends the consolidation, current + 1 when the content
    /// restates from the beginning (a rewrite).
    async fn derive_append_epoch(
        &self,
        conversation: &ConversationRow,
        group: &GroupRow,
        client_id: &str,
        content: &[ContentBlock],
    ) -> CoreResult<i64> {
        let (consolidated, epoch) = self
            .consolidated_memory(conversation, group, client_id)
            .await?;
        if consolidated.is_empty() {
            return Ok(epoch.max(1));
        }
        let restates = content
            .first()
            .is_some_and(|first| consolidated.first() == Some(first));
        Ok(if restates { epoch + 1 } else { epoch })
    }

    // ==================== Fork-aware listing ====================

    /// The fork chain from root to the given conversation.
    pub(crate) async fn ancestry_chain(
        &self,
        conversation: ConversationRow,
    ) -> CoreResult<Vec<ConversationRow>> {
        let mut chain = vec![conversation];
        loop {
            let Some(parent_id) = chain
                .last()
                .and_then(|c| c.forked_at_conversation_id)
            else {
                break;
            };
            let parent = self
                .store
                .conversations()
                .get_by_id(parent_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Storage(format!("fork parent {} missing", parent_id))
                })?;
            chain.push(parent);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Synthetic entry emitted at the join point between an ancestor and
    /// a fork. Keyed by the fork conversation so its position is stable.
    fn fork_step(fork: &ConversationRow) -> Entry {
        let parent = fork
            .forked_at_conversation_id
            .map(|u| u.to_string())
            .unwrap_or_default();
        let at = fork
            .forked_at_entry_id
            .map(|u| u.to_string())
            .unwrap_or_default();
        Entry {
            id: fork.id,
            conversation_id: fork.id,
            conversation_group_id: fork.conversation_group_id,
            channel: Channel::History,
            client_id: None,
            content_type: FORK_STEP_CONTENT_TYPE.to_string(),
            content: vec![ContentBlock::text(
                "system",
                format!("Forked from conversation {} at entry {}", parent, at),
            )],
            indexed_content: None,
            indexed_at: None,
            epoch: 0,
            created_at: fork.created_at,
        }
    }

    /// Reconstruct the visible entries of a conversation by ancestry
    /// traversal: each ancestor contributes its own entries strictly
    /// before the next fork point, with a fork-step entry at each join.
    async fn assemble_ancestry(&self, chain: &[ConversationRow]) -> CoreResult<Vec<Entry>> {
        let mut result = Vec::new();
        for (i, ancestor) in chain.iter().enumerate() {
            if i > 0 {
                result.push(Self::fork_step(ancestor));
            }
            let own = self
                .store
                .entries()
                .list_by_conversation(ancestor.conversation_group_id, ancestor.id)
                .await?;

            // The child's fork entry bounds this ancestor's contribution:
            // strictly before the fork point, in creation order.
            let bound = chain.get(i + 1).and_then(|child| child.forked_at_entry_id);
            let bound_key = match bound {
                Some(entry_id) => own
                    .iter()
                    .find(|e| e.id == entry_id)
                    .map(|e| (e.created_at, e.id)),
                None => None,
            };

            for row in &own {
                if let Some(key) = bound_key
                    && (row.created_at, row.id) >= key
                {
                    continue;
                }
                result.push(self.decrypt_entry(row)?);
            }
        }
        Ok(result)
    }

    /// Union of every conversation's entries in the group, plus one
    /// fork-step per fork, globally ordered.
    async fn assemble_group(&self, group_id: Uuid) -> CoreResult<Vec<Entry>> {
        let conversations = self.store.conversations().list_by_group(group_id, true).await?;
        let mut result: Vec<Entry> = Vec::new();
        for conversation in &conversations {
            if conversation.is_fork() {
                result.push(Self::fork_step(conversation));
            }
        }
        for row in self.store.entries().list_by_group(group_id).await? {
            result.push(self.decrypt_entry(&row)?);
        }
        result.sort_by(|a, b| {
            (a.created_at, a.id).cmp(&(b.created_at, b.id))
        });
        Ok(result)
    }

    pub async fn list(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        query: &ListEntriesQuery,
        include_deleted: bool,
    ) -> CoreResult<ListResult<Entry>> {
        let (conversation, group) = self
            .load_conversation(conversation_id, include_deleted)
            .await?;
        self.access
            .require(identity, &group, crate::models::AccessLevel::Reader)
            .await?;

        let assembled = match query.forks {
            ForkMode::None => {
                let chain = self.ancestry_chain(conversation).await?;
                self.assemble_ancestry(&chain).await?
            }
            ForkMode::All => self.assemble_group(group.id).await?,
            ForkMode::Latest => {
                let latest = self
                    .store
                    .conversations()
                    .latest_in_group(group.id)
                    .await?
                    .unwrap_or(conversation);
                let chain = self.ancestry_chain(latest).await?;
                self.assemble_ancestry(&chain).await?
            }
        };

        // Channel and MEMORY-scoping filters apply after ancestry
        // assembly; filtering during traversal could drop a fork-point
        // entry and break the chain.
        let filtered: Vec<Entry> = assembled
            .into_iter()
            .filter(|e| match query.channel {
                Some(channel) => e.channel == channel,
                None => true,
            })
            .filter(|e| {
                if e.channel != Channel::Memory {
                    return true;
                }
                match &identity.client_id {
                    Some(client) => e.client_id.as_deref() == Some(client),
                    None => true,
                }
            })
            .collect();

        Ok(Self::paginate(filtered, query.after.as_ref(), query.limit))
    }

    /// Cursor pagination over an assembled sequence. The sequence order
    /// is stable, so resuming means skipping past the cursor position.
    fn paginate(
        entries: Vec<Entry>,
        after: Option<&Cursor>,
        limit: Option<i64>,
    ) -> ListResult<Entry> {
        let limit = validators::clamp_limit(limit, validators::MAX_ADMIN_LIST_LIMIT);

        let start = match after {
            None => 0,
            Some(cursor) => match entries.iter().position(|e| e.id == cursor.id) {
                Some(pos) => pos + 1,
                // Cursor row no longer present: resume by sort key.
                None => entries
                    .iter()
                    .position(|e| (e.created_at, e.id) > (cursor.created_at, cursor.id))
                    .unwrap_or(entries.len()),
            },
        };

        let remaining = &entries[start.min(entries.len())..];
        let has_more = remaining.len() as i64 > limit;
        let items: Vec<Entry> = remaining.iter().take(limit as usize).cloned().collect();
        let next = if has_more {
            items.last().map(|e| Cursor::new(e.created_at, e.id))
        } else {
            None
        };
        ListResult::new(items, has_more, next)
    }

    // ==================== MEMORY sync ====================

    /// Consolidated MEMORY content for (conversation, client): inherited
    /// parent entries included via ancestry, then the blocks of all
    /// entries at the latest epoch concatenated in order.
    async fn consolidated_memory(
        &self,
        conversation: &ConversationRow,
        _group: &GroupRow,
        client_id: &str,
    ) -> CoreResult<(Vec<ContentBlock>, i64)> {
        let chain = self.ancestry_chain(conversation.clone()).await?;
        let mut memory_entries: Vec<Entry> = Vec::new();
        for (i, ancestor) in chain.iter().enumerate() {
            let rows = self
                .store
                .entries()
                .list_memory(ancestor.conversation_group_id, ancestor.id, client_id)
                .await?;
            let bound = chain.get(i + 1).and_then(|child| child.forked_at_entry_id);
            let bound_key = match bound {
                Some(entry_id) => {
                    let all = self
                        .store
                        .entries()
                        .get_by_id(ancestor.conversation_group_id, entry_id)
                        .await?;
                    all.map(|e| (e.created_at, e.id))
                }
                None => None,
            };
            for row in &rows {
                if let Some(key) = bound_key
                    && (row.created_at, row.id) >= key
                {
                    continue;
                }
                memory_entries.push(self.decrypt_entry(row)?);
            }
        }

        let latest_epoch = memory_entries.iter().map(|e| e.epoch).max().unwrap_or(0);
        let consolidated: Vec<ContentBlock> = memory_entries
            .iter()
            .filter(|e| e.epoch == latest_epoch)
            .flat_map(|e| e.content.iter().cloned())
            .collect();
        Ok((consolidated, latest_epoch))
    }

    fn longest_common_prefix(a: &[ContentBlock], b: &[ContentBlock]) -> usize {
        a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
    }

    /// Replace the latest MEMORY epoch's content for (conversation,
    /// client) with the supplied list: a strict extension appends the
    /// delta at the same epoch, a divergence starts epoch + 1.
    pub async fn sync_memory(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        input: SyncMemory,
    ) -> CoreResult<SyncOutcome> {
        let (conversation, group) = self.load_conversation(conversation_id, false).await?;
        self.access
            .require(identity, &group, crate::models::AccessLevel::Writer)
            .await?;
        let client_id = identity.client_id.clone().ok_or_else(|| {
            CoreError::Validation("MEMORY sync requires an agent identity (client id)".to_string())
        })?;

        let (consolidated, current_epoch) = self
            .consolidated_memory(&conversation, &group, &client_id)
            .await?;

        let lcp = Self::longest_common_prefix(&consolidated, &input.content);

        let (content, epoch, incremented) = if lcp == consolidated.len() {
            let delta: Vec<ContentBlock> = input.content[lcp..].to_vec();
            if delta.is_empty() {
                // Identical list: idempotent no-op.
                return Ok(SyncOutcome {
                    entry_id: None,
                    epoch: current_epoch,
                    epoch_incremented: false,
                });
            }
            let epoch = if current_epoch == 0 { 1 } else { current_epoch };
            (delta, epoch, false)
        } else {
            (input.content.clone(), current_epoch + 1, true)
        };

        let now = truncate_to_millis(Utc::now());
        let row = EntryRow {
            id: Uuid::new_v4(),
            conversation_id,
            conversation_group_id: group.id,
            channel: Channel::Memory.as_str().to_string(),
            client_id: Some(client_id),
            content_type: input.content_type.clone(),
            content: self.encrypt_content(&content)?,
            indexed_content: None,
            indexed_at: None,
            epoch,
            created_at: now,
        };
        self.store.entries().insert(&row).await?;
        self.store.conversations().touch(conversation_id, now).await?;

        Ok(SyncOutcome {
            entry_id: Some(row.id),
            epoch,
            epoch_incremented: incremented,
        })
    }

    /// Get a single entry by conversation + id, access-checked.
    pub async fn get(
        &self,
        identity: &Identity,
        conversation_id: Uuid,
        entry_id: Uuid,
    ) -> CoreResult<Entry> {
        let (_conversation, group) = self.load_conversation(conversation_id, false).await?;
        self.access
            .require(identity, &group, crate::models::AccessLevel::Reader)
            .await?;
        let row = self
            .store
            .entries()
            .get_by_id(group.id, entry_id)
            .await?
            .ok_or_else(|| CoreError::not_found("entry"))?;
        self.decrypt_entry(&row)
    }

    #[cfg(test)]
    pub(crate) fn lcp_for_tests(a: &[ContentBlock], b: &[ContentBlock]) -> usize {
        Self::longest_common_prefix(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(role: &str, body: &str) -> ContentBlock {
        ContentBlock::text(role, body)
    }

    #[test]
    fn lcp_of_extension_is_full_prefix() {
        let a = vec![text("user", "one"), text("assistant", "two")];
        let b = vec![
            text("user", "one"),
            text("assistant", "two"),
            text("user", "three"),
        ];
        assert_eq!(EntryService::lcp_for_tests(&a, &b), 2);
    }

    #[test]
    fn lcp_of_divergence_stops_early() {
        let a = vec![text("user", "one"), text("assistant", "two")];
        let b = vec![text("user", "one"), text("assistant", "other")];
        assert_eq!(EntryService::lcp_for_tests(&a, &b), 1);
    }

    #[test]
    fn lcp_with_empty_prefix_is_zero() {
        let a: Vec<ContentBlock> = vec![];
        let b = vec![text("user", "one")];
        assert_eq!(EntryService::lcp_for_tests(&a, &b), 0);
    }
}
