//! In-process vector backend for tests: cosine similarity over stored
//! vectors, substring matching with `<mark>` highlights for full-text.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{SearchScope, VectorHit, VectorStore, VectorStoreError, VectorStoreResult};

#[derive(Debug, Clone)]
struct StoredEntry {
    conversation_id: Uuid,
    conversation_group_id: Uuid,
    vector: Vec<f32>,
    indexed_text: String,
    created_at: DateTime<Utc>,
}

/// Test backend with switchable availability and failure injection.
#[derive(Default)]
pub struct TestVectorStore {
    entries: RwLock<std::collections::HashMap<Uuid, StoredEntry>>,
    semantic_enabled: AtomicBool,
    full_text_enabled: AtomicBool,
    fail_upserts: AtomicBool,
}

impl TestVectorStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(std::collections::HashMap::new()),
            semantic_enabled: AtomicBool::new(true),
            full_text_enabled: AtomicBool::new(true),
            fail_upserts: AtomicBool::new(false),
        }
    }

    pub fn set_semantic_enabled(&self, enabled: bool) {
        self.semantic_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_full_text_enabled(&self, enabled: bool) {
        self.full_text_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make upserts fail, simulating a vector store outage.
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entry_id: Uuid) -> bool {
        self.entries.read().contains_key(&entry_id)
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
        let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    fn in_scope(entry: &StoredEntry, scope: &SearchScope) -> bool {
        if !scope.group_ids.contains(&entry.conversation_group_id) {
            return false;
        }
        match &scope.conversation_ids {
            Some(ids) => ids.contains(&entry.conversation_id),
            None => true,
        }
    }

    fn rank(mut hits: Vec<(VectorHit, DateTime<Utc>)>, limit: i64) -> Vec<VectorHit> {
        // Descending score, then descending created_at, then id ascending.
        hits.sort_by(|(a, a_at), (b, b_at)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_at.cmp(a_at))
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        hits.into_iter()
            .take(limit as usize)
            .map(|(hit, _)| hit)
            .collect()
    }
}

#[async_trait]
impl VectorStore for TestVectorStore {
    async fn upsert_embedding(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        entry_id: Uuid,
        vector: &[f32],
        indexed_text: &str,
    ) -> VectorStoreResult<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Unavailable("injected failure".to_string()));
        }
        self.entries.write().insert(
            entry_id,
            StoredEntry {
                conversation_id,
                conversation_group_id: group_id,
                vector: vector.to_vec(),
                indexed_text: indexed_text.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_by_group(&self, group_id: Uuid) -> VectorStoreResult<u64> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.conversation_group_id != group_id);
        Ok((before - entries.len()) as u64)
    }

    async fn semantic_search(
        &self,
        query_vector: &[f32],
        scope: &SearchScope,
        limit: i64,
    ) -> VectorStoreResult<Vec<VectorHit>> {
        if !self.is_semantic_search_available() {
            return Err(VectorStoreError::Unavailable("semantic disabled".to_string()));
        }
        let entries = self.entries.read();
        let hits = entries
            .iter()
            .filter(|(_, e)| Self::in_scope(e, scope))
            .map(|(id, e)| {
                (
                    VectorHit {
                        entry_id: *id,
                        conversation_id: e.conversation_id,
                        conversation_group_id: e.conversation_group_id,
                        score: Self::cosine_similarity(query_vector, &e.vector),
                        highlight: Some(super::semantic_highlight(&e.indexed_text)),
                    },
                    e.created_at,
                )
            })
            .collect();
        Ok(Self::rank(hits, limit))
    }

    async fn full_text_search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: i64,
    ) -> VectorStoreResult<Vec<VectorHit>> {
        if !self.is_full_text_search_available() {
            return Err(VectorStoreError::Unavailable("fulltext disabled".to_string()));
        }
        let needle = query.to_lowercase();
        let entries = self.entries.read();
        let hits = entries
            .iter()
            .filter(|(_, e)| Self::in_scope(e, scope))
            .filter_map(|(id, e)| {
                let haystack = e.indexed_text.to_lowercase();
                let pos = haystack.find(&needle)?;
                let matched = &e.indexed_text[pos..pos + needle.len()];
                let highlight = format!(
                    "{}<mark>{}</mark>{}",
                    &e.indexed_text[..pos],
                    matched,
                    &e.indexed_text[pos + needle.len()..]
                );
                Some((
                    VectorHit {
                        entry_id: *id,
                        conversation_id: e.conversation_id,
                        conversation_group_id: e.conversation_group_id,
                        score: needle.len() as f64 / e.indexed_text.len().max(1) as f64,
                        highlight: Some(highlight),
                    },
                    e.created_at,
                ))
            })
            .collect();
        Ok(Self::rank(hits, limit))
    }

    fn is_semantic_search_available(&self) -> bool {
        self.semantic_enabled.load(Ordering::SeqCst)
    }

    fn is_full_text_search_available(&self) -> bool {
        self.full_text_enabled.load(Ordering::SeqCst)
    }

    async fn ensure_schema(&self) -> VectorStoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(group_id: Uuid) -> SearchScope {
        SearchScope {
            group_ids: vec![group_id],
            conversation_ids: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_entry_id() {
        let store = TestVectorStore::new();
        let (g, c, e) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.upsert_embedding(g, c, e, &[1.0, 0.0], "one").await.unwrap();
        store.upsert_embedding(g, c, e, &[0.0, 1.0], "two").await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_by_group_removes_only_that_group() {
        let store = TestVectorStore::new();
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();
        store
            .upsert_embedding(g1, Uuid::new_v4(), Uuid::new_v4(), &[1.0], "a")
            .await
            .unwrap();
        store
            .upsert_embedding(g2, Uuid::new_v4(), Uuid::new_v4(), &[1.0], "b")
            .await
            .unwrap();
        assert_eq!(store.delete_by_group(g1).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn semantic_search_ranks_by_similarity() {
        let store = TestVectorStore::new();
        let g = Uuid::new_v4();
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        store
            .upsert_embedding(g, Uuid::new_v4(), close, &[1.0, 0.0], "close")
            .await
            .unwrap();
        store
            .upsert_embedding(g, Uuid::new_v4(), far, &[0.0, 1.0], "far")
            .await
            .unwrap();

        let hits = store
            .semantic_search(&[1.0, 0.1], &scope(g), 10)
            .await
            .unwrap();
        assert_eq!(hits[0].entry_id, close);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn full_text_search_marks_matches() {
        let store = TestVectorStore::new();
        let g = Uuid::new_v4();
        store
            .upsert_embedding(g, Uuid::new_v4(), Uuid::new_v4(), &[1.0], "I like apples a lot")
            .await
            .unwrap();

        let hits = store.full_text_search("apples", &scope(g), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].highlight.as_deref().unwrap().contains("<mark>apples</mark>"));
    }

    #[tokio::test]
    async fn out_of_scope_entries_invisible() {
        let store = TestVectorStore::new();
        let g = Uuid::new_v4();
        store
            .upsert_embedding(g, Uuid::new_v4(), Uuid::new_v4(), &[1.0], "apples")
            .await
            .unwrap();

        let other = scope(Uuid::new_v4());
        assert!(store.full_text_search("apples", &other, 10).await.unwrap().is_empty());
        assert!(store.semantic_search(&[1.0], &other, 10).await.unwrap().is_empty());
    }
}
