//! Vector backends: per-entry embeddings with ANN search and an
//! inverted-index full-text fallback.

#[cfg(feature = "database-postgres")]
mod pgvector;
pub mod test;

use async_trait::async_trait;
#[cfg(feature = "database-postgres")]
pub use pgvector::PgvectorStore;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store query failed: {0}")]
    Query(String),

    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type VectorStoreResult<T> = Result<T, VectorStoreError>;

/// Access scope for a search: the groups the caller can see, computed in
/// the primary store and passed as an IN-list, optionally narrowed to
/// specific conversations.
#[derive(Debug, Clone)]
pub struct SearchScope {
    pub group_ids: Vec<Uuid>,
    pub conversation_ids: Option<Vec<Uuid>>,
}

impl SearchScope {
    pub fn is_empty(&self) -> bool {
        self.group_ids.is_empty()
    }
}

/// One hit from a vector or full-text query.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub entry_id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_group_id: Uuid,
    pub score: f64,
    pub highlight: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent by entry id: re-indexing replaces the stored vector
    /// and indexed text.
    async fn upsert_embedding(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        entry_id: Uuid,
        vector: &[f32],
        indexed_text: &str,
    ) -> VectorStoreResult<()>;

    /// Bulk delete for an evicted conversation group. Returns rows removed.
    async fn delete_by_group(&self, group_id: Uuid) -> VectorStoreResult<u64>;

    /// ANN search. Results ordered by descending score, then descending
    /// creation time, then entry id.
    async fn semantic_search(
        &self,
        query_vector: &[f32],
        scope: &SearchScope,
        limit: i64,
    ) -> VectorStoreResult<Vec<VectorHit>>;

    /// Inverted-index full-text search over the indexed text, with
    /// query-aware `<mark>` highlights.
    async fn full_text_search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: i64,
    ) -> VectorStoreResult<Vec<VectorHit>>;

    fn is_semantic_search_available(&self) -> bool;

    fn is_full_text_search_available(&self) -> bool;

    /// Create backing tables and indexes. Called once at boot.
    async fn ensure_schema(&self) -> VectorStoreResult<()>;
}

/// Width of the static prefix used as a semantic-search highlight.
pub const SEMANTIC_HIGHLIGHT_CHARS: usize = 200;

/// Static, query-insensitive highlight for semantic hits: a prefix of
/// the indexed text.
pub fn semantic_highlight(indexed_text: &str) -> String {
    indexed_text
        .chars()
        .take(SEMANTIC_HIGHLIGHT_CHARS)
        .collect()
}
