//! Search coordination: the per-entry indexing lifecycle and hybrid
//! semantic / full-text routing.
//!
//! Write path: entries created with `indexed_content` get a synchronous
//! embedding + upsert attempt. On success `indexed_at` is stamped; on
//! failure the write proceeds un-indexed and the singleton
//! `vector_store_index_retry` task picks it up later.

pub mod embedding;
pub mod vector;

use std::sync::Arc;

use chrono::{DateTime, Utc};
pub use embedding::{Embedder, EmbeddingError, OpenAiEmbedder};
use uuid::Uuid;
pub use vector::{SearchScope, VectorHit, VectorStore, VectorStoreError};

use sha2::{Digest, Sha256};

use crate::{
    auth::Identity,
    cache::Cache,
    config::TasksConfig,
    crypto::{DekProvider, FieldId},
    models::{
        Channel, ContentBlock, Entry, IndexRequest, SearchRequest, SearchResponse, SearchResult,
        SearchType, TASK_VECTOR_STORE_INDEX_RETRY, validators,
    },
    services::{CoreError, CoreResult},
    store::{EntryRow, StorePool},
};

/// Entries processed per index-retry task invocation.
const INDEX_RETRY_BATCH: i64 = 100;

/// TTL for cached query embeddings.
const QUERY_EMBEDDING_TTL: std::time::Duration = std::time::Duration::from_secs(600);

/// Result of one index-retry pass.
#[derive(Debug, Default)]
pub struct IndexRetryResult {
    pub indexed: u64,
    pub failed: u64,
    pub remaining: bool,
}

pub struct SearchCoordinator {
    store: Arc<StorePool>,
    vector: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    crypto: DekProvider,
    cache: Option<Arc<dyn Cache>>,
    tasks_config: TasksConfig,
}

impl SearchCoordinator {
    pub fn new(
        store: Arc<StorePool>,
        vector: Option<Arc<dyn VectorStore>>,
        embedder: Option<Arc<dyn Embedder>>,
        crypto: DekProvider,
        cache: Option<Arc<dyn Cache>>,
        tasks_config: TasksConfig,
    ) -> Self {
        Self {
            store,
            vector,
            embedder,
            crypto,
            cache,
            tasks_config,
        }
    }

    /// Embed a search query, reusing a cached vector for repeated
    /// queries. Cache failures are logged and bypassed.
    async fn embed_query(&self, embedder: &Arc<dyn Embedder>, query: &str) -> CoreResult<Vec<f32>> {
        let key = format!("engram:qemb:{}", hex::encode(Sha256::digest(query)));

        if let Some(cache) = &self.cache {
            match cache.get_bytes(&key).await {
                Ok(Some(bytes)) => {
                    if let Ok(vector) = serde_json::from_slice::<Vec<f32>>(&bytes)
                        && vector.len() == embedder.dimensions()
                    {
                        return Ok(vector);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "cache read failed, bypassing"),
            }
        }

        let vector = embedder
            .embed(query)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        if let Some(cache) = &self.cache {
            match serde_json::to_vec(&vector) {
                Ok(bytes) => {
                    if let Err(e) = cache.set_bytes(&key, &bytes, QUERY_EMBEDDING_TTL).await {
                        tracing::warn!(error = %e, "cache write failed, bypassing");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "embedding not serializable for cache"),
            }
        }
        Ok(vector)
    }

    fn semantic_available(&self) -> bool {
        self.embedder.is_some()
            && self
                .vector
                .as_ref()
                .is_some_and(|v| v.is_semantic_search_available())
    }

    fn full_text_available(&self) -> bool {
        self.vector
            .as_ref()
            .is_some_and(|v| v.is_full_text_search_available())
    }

    fn available_types(&self) -> Vec<SearchType> {
        let mut types = Vec::new();
        if self.semantic_available() {
            types.push(SearchType::Semantic);
        }
        if self.full_text_available() {
            types.push(SearchType::Fulltext);
        }
        types
    }

    // ==================== Indexing lifecycle ====================

    async fn index_one(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        entry_id: Uuid,
        text: &str,
    ) -> CoreResult<()> {
        let vector = self
            .vector
            .as_ref()
            .ok_or_else(|| CoreError::Storage("vector store not configured".to_string()))?;
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| CoreError::Storage("embedding source not configured".to_string()))?;

        let embedding = embedder
            .embed(text)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        vector
            .upsert_embedding(group_id, conversation_id, entry_id, &embedding, text)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Synchronous write-path indexing attempt. Failures degrade to
    /// "not yet indexed" and arm the singleton retry task; they never
    /// block the primary write.
    pub async fn index_entry_inline(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        entry_id: Uuid,
        text: &str,
    ) -> Option<DateTime<Utc>> {
        if self.vector.is_none() || self.embedder.is_none() {
            return None;
        }
        match self.index_one(group_id, conversation_id, entry_id, text).await {
            Ok(()) => {
                let now = Utc::now();
                match self
                    .store
                    .entries()
                    .set_indexed_at(group_id, entry_id, now)
                    .await
                {
                    Ok(()) => Some(now),
                    Err(e) => {
                        tracing::error!(entry_id = %entry_id, error = %e, "failed to stamp indexed_at");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    entry_id = %entry_id,
                    error = %e,
                    "synchronous vector indexing failed, arming retry task"
                );
                self.enqueue_index_retry(chrono::Duration::zero()).await;
                None
            }
        }
    }

    /// Arm the singleton retry task. Concurrent calls collapse into one
    /// pending row.
    pub async fn enqueue_index_retry(&self, delay: chrono::Duration) {
        let result = self
            .store
            .tasks()
            .enqueue(
                TASK_VECTOR_STORE_INDEX_RETRY,
                Some(TASK_VECTOR_STORE_INDEX_RETRY),
                serde_json::json!({}),
                Utc::now() + delay,
            )
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to enqueue vector index retry task");
        }
    }

    /// One pass of the retry task: scan entries with `indexed_content`
    /// but no `indexed_at`, embed and upsert each, stamp completion.
    pub async fn run_index_retry(&self) -> CoreResult<IndexRetryResult> {
        let pending = self
            .store
            .entries()
            .list_pending_index(INDEX_RETRY_BATCH + 1)
            .await?;
        let remaining_after = pending.len() as i64 > INDEX_RETRY_BATCH;
        let batch: Vec<_> = pending.into_iter().take(INDEX_RETRY_BATCH as usize).collect();

        let mut result = IndexRetryResult {
            remaining: remaining_after,
            ..Default::default()
        };
        for row in batch {
            let Some(text) = row.indexed_content.as_deref() else {
                continue;
            };
            match self
                .index_one(row.conversation_group_id, row.conversation_id, row.id, text)
                .await
            {
                Ok(()) => {
                    self.store
                        .entries()
                        .set_indexed_at(row.conversation_group_id, row.id, Utc::now())
                        .await?;
                    result.indexed += 1;
                }
                Err(e) => {
                    tracing::warn!(entry_id = %row.id, error = %e, "index retry failed for entry");
                    result.failed += 1;
                }
            }
        }

        if result.remaining {
            // More work than one batch: the task re-arms itself.
            self.enqueue_index_retry(chrono::Duration::seconds(1)).await;
        }
        Ok(result)
    }

    /// Batch index submission (indexer role): backfill `indexed_content`
    /// and attempt inline indexing, element by element.
    pub async fn batch_index(
        &self,
        identity: &Identity,
        request: IndexRequest,
    ) -> CoreResult<u64> {
        if !identity.is_indexer() && !identity.is_admin() {
            return Err(CoreError::AccessDenied("requires indexer role".to_string()));
        }

        let mut accepted = 0u64;
        for item in request.entries {
            let conversation = self
                .store
                .conversations()
                .get_by_id(item.conversation_id)
                .await?
                .ok_or_else(|| CoreError::not_found("conversation"))?;
            let entry = self
                .store
                .entries()
                .get_by_id(conversation.conversation_group_id, item.entry_id)
                .await?
                .ok_or_else(|| CoreError::not_found("entry"))?;
            if entry.channel != Channel::History.as_str() {
                return Err(CoreError::Validation(
                    "indexedContent is only accepted on HISTORY entries".to_string(),
                ));
            }

            self.store
                .entries()
                .set_indexed_content(
                    conversation.conversation_group_id,
                    item.entry_id,
                    &item.indexed_content,
                )
                .await?;
            self.index_entry_inline(
                conversation.conversation_group_id,
                item.conversation_id,
                item.entry_id,
                &item.indexed_content,
            )
            .await;
            accepted += 1;
        }
        Ok(accepted)
    }

    // ==================== Search routing ====================

    async fn run_semantic(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: i64,
    ) -> CoreResult<Vec<VectorHit>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| CoreError::Storage("embedding source not configured".to_string()))?;
        let vector = self
            .vector
            .as_ref()
            .ok_or_else(|| CoreError::Storage("vector store not configured".to_string()))?;
        let query_vector = self.embed_query(embedder, query).await?;
        vector
            .semantic_search(&query_vector, scope, limit)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))
    }

    async fn run_full_text(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: i64,
    ) -> CoreResult<Vec<VectorHit>> {
        let vector = self
            .vector
            .as_ref()
            .ok_or_else(|| CoreError::Storage("vector store not configured".to_string()))?;
        vector
            .full_text_search(query, scope, limit)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))
    }

    /// Search the caller's accessible conversations. `scope_user` is the
    /// user whose access bounds the query (the caller on the agent API,
    /// an optional impersonated user on the admin API).
    pub async fn search(
        &self,
        scope: SearchScope,
        request: &SearchRequest,
    ) -> CoreResult<SearchResponse> {
        let limit = validators::clamp_limit(request.limit, validators::MAX_AGENT_LIST_LIMIT);

        let (hits, served_by) = match request.search_type {
            SearchType::Semantic => {
                if !self.semantic_available() {
                    return Err(CoreError::SearchTypeUnavailable {
                        available: self.available_types(),
                    });
                }
                (
                    self.run_semantic(&request.query, &scope, limit).await?,
                    SearchType::Semantic,
                )
            }
            SearchType::Fulltext => {
                if !self.full_text_available() {
                    return Err(CoreError::SearchTypeUnavailable {
                        available: self.available_types(),
                    });
                }
                (
                    self.run_full_text(&request.query, &scope, limit).await?,
                    SearchType::Fulltext,
                )
            }
            SearchType::Auto => {
                let mut hits = Vec::new();
                let mut served_by = SearchType::Auto;
                if self.semantic_available() {
                    hits = self.run_semantic(&request.query, &scope, limit).await?;
                    served_by = SearchType::Semantic;
                }
                if hits.is_empty() && self.full_text_available() {
                    hits = self.run_full_text(&request.query, &scope, limit).await?;
                    served_by = SearchType::Fulltext;
                }
                (hits, served_by)
            }
        };

        // Hits arrive ranked, so keeping the first per conversation
        // keeps the best.
        let hits = if request.group_by_conversation {
            let mut seen = std::collections::HashSet::new();
            hits.into_iter()
                .filter(|h| seen.insert(h.conversation_id))
                .collect()
        } else {
            hits
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let (conversation_title, entry) = self
                .hydrate(&hit, request.include_entry)
                .await
                .unwrap_or((None, None));
            results.push(SearchResult {
                entry_id: hit.entry_id,
                conversation_id: hit.conversation_id,
                conversation_group_id: hit.conversation_group_id,
                score: hit.score,
                highlights: hit.highlight.clone().into_iter().collect(),
                conversation_title,
                entry,
            });
        }

        Ok(SearchResponse {
            results,
            search_type: served_by,
        })
    }

    /// Attach the conversation title and, when asked, the decrypted
    /// entry. Hydration failures degrade to bare hits.
    async fn hydrate(
        &self,
        hit: &VectorHit,
        include_entry: bool,
    ) -> CoreResult<(Option<String>, Option<Entry>)> {
        let group = self
            .store
            .groups()
            .get_by_id(hit.conversation_group_id)
            .await?;
        let title = match &group {
            Some(g) => g
                .title
                .as_deref()
                .map(|sealed| {
                    self.crypto
                        .envelope()
                        .open_str(FieldId::GroupTitle, sealed)
                })
                .transpose()?,
            None => None,
        };

        let entry = if include_entry {
            self.store
                .entries()
                .get_by_id(hit.conversation_group_id, hit.entry_id)
                .await?
                .map(|row| self.decrypt_entry_row(&row))
                .transpose()?
        } else {
            None
        };
        Ok((title, entry))
    }

    fn decrypt_entry_row(&self, row: &EntryRow) -> CoreResult<Entry> {
        let plaintext = self
            .crypto
            .envelope()
            .open(FieldId::EntryContent, &row.content)?;
        let content: Vec<ContentBlock> = serde_json::from_slice(&plaintext)?;
        Ok(Entry {
            id: row.id,
            conversation_id: row.conversation_id,
            conversation_group_id: row.conversation_group_id,
            channel: row
                .channel
                .parse()
                .map_err(|e: String| CoreError::Storage(e))?,
            client_id: row.client_id.clone(),
            content_type: row.content_type.clone(),
            content,
            indexed_content: row.indexed_content.clone(),
            indexed_at: row.indexed_at,
            epoch: row.epoch,
            created_at: row.created_at,
        })
    }

    /// Access scope for an agent-API search: groups where the caller
    /// holds a live membership.
    pub async fn scope_for_user(
        &self,
        identity: &Identity,
        conversation_ids: Option<Vec<Uuid>>,
    ) -> CoreResult<SearchScope> {
        let group_ids = self
            .store
            .memberships()
            .accessible_group_ids(&identity.user_id)
            .await?;
        Ok(SearchScope {
            group_ids,
            conversation_ids,
        })
    }

    /// The default retry delay for failed tasks, exposed for workers.
    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tasks_config.retry_delay_secs as i64)
    }

    /// Availability probes for the health endpoint.
    pub fn semantic_available_probe(&self) -> bool {
        self.semantic_available()
    }

    pub fn full_text_available_probe(&self) -> bool {
        self.full_text_available()
    }
}
