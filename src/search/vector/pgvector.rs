//! PostgreSQL with the pgvector extension.
//!
//! Embeddings and the tsvector column share one table in the primary
//! database. ANN uses cosine distance (`<=>`); full-text uses
//! `websearch_to_tsquery` + `ts_rank_cd` over a GIN index, with
//! `ts_headline` producing `<mark>` snippets.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{SearchScope, VectorHit, VectorStore, VectorStoreError, VectorStoreResult};

pub struct PgvectorStore {
    pool: PgPool,
    table_name: String,
    dimensions: usize,
}

impl PgvectorStore {
    pub fn new(pool: PgPool, table_name: String, dimensions: usize) -> Self {
        Self {
            pool,
            table_name,
            dimensions,
        }
    }

    /// pgvector accepts vectors as `[x,y,z]` literals; sqlx has no
    /// native vector type, so bind text and cast.
    fn vector_literal(vector: &[f32]) -> String {
        let mut out = String::with_capacity(vector.len() * 8 + 2);
        out.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&v.to_string());
        }
        out.push(']');
        out
    }

    fn check_dimensions(&self, vector: &[f32]) -> VectorStoreResult<()> {
        if vector.len() != self.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn scope_clause(scope: &SearchScope, first_param: usize) -> (String, bool) {
        let mut clause = format!("conversation_group_id = ANY(${})", first_param);
        let narrow = scope.conversation_ids.is_some();
        if narrow {
            clause.push_str(&format!(" AND conversation_id = ANY(${})", first_param + 1));
        }
        (clause, narrow)
    }
}

#[async_trait]
impl VectorStore for PgvectorStore {
    async fn upsert_embedding(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        entry_id: Uuid,
        vector: &[f32],
        indexed_text: &str,
    ) -> VectorStoreResult<()> {
        self.check_dimensions(vector)?;
        let sql = format!(
            r#"
            INSERT INTO {} (entry_id, conversation_id, conversation_group_id,
                            embedding, content_tsvector, indexed_text, created_at)
            VALUES ($1, $2, $3, $4::vector, to_tsvector('english', $5), $5, NOW())
            ON CONFLICT (entry_id)
            DO UPDATE SET embedding = EXCLUDED.embedding,
                          content_tsvector = EXCLUDED.content_tsvector,
                          indexed_text = EXCLUDED.indexed_text
            "#,
            self.table_name
        );
        sqlx::query(&sql)
            .bind(entry_id)
            .bind(conversation_id)
            .bind(group_id)
            .bind(Self::vector_literal(vector))
            .bind(indexed_text)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_group(&self, group_id: Uuid) -> VectorStoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE conversation_group_id = $1", self.table_name);
        let result = sqlx::query(&sql)
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn semantic_search(
        &self,
        query_vector: &[f32],
        scope: &SearchScope,
        limit: i64,
    ) -> VectorStoreResult<Vec<VectorHit>> {
        self.check_dimensions(query_vector)?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let (scope_clause, narrowed) = Self::scope_clause(scope, 2);
        let limit_param = if narrowed { 4 } else { 3 };
        // Cosine distance is in [0, 2]; similarity = 1 - distance.
        let sql = format!(
            r#"
            SELECT entry_id, conversation_id, conversation_group_id, indexed_text,
                   1 - (embedding <=> $1::vector) AS score
            FROM {}
            WHERE {}
            ORDER BY embedding <=> $1::vector ASC, created_at DESC, entry_id ASC
            LIMIT ${}
            "#,
            self.table_name, scope_clause, limit_param
        );

        let mut query = sqlx::query(&sql)
            .bind(Self::vector_literal(query_vector))
            .bind(&scope.group_ids);
        if let Some(conversation_ids) = &scope.conversation_ids {
            query = query.bind(conversation_ids);
        }
        query = query.bind(limit);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let indexed_text: String = row.get("indexed_text");
                VectorHit {
                    entry_id: row.get("entry_id"),
                    conversation_id: row.get("conversation_id"),
                    conversation_group_id: row.get("conversation_group_id"),
                    score: row.get::<f64, _>("score"),
                    highlight: Some(super::semantic_highlight(&indexed_text)),
                }
            })
            .collect())
    }

    async fn full_text_search(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: i64,
    ) -> VectorStoreResult<Vec<VectorHit>> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let (scope_clause, narrowed) = Self::scope_clause(scope, 2);
        let limit_param = if narrowed { 4 } else { 3 };
        // websearch_to_tsquery handles quoted phrases, OR, and -exclusion.
        // ts_rank_cd cover-density rank is normalized to [0, 1) via
        // rank / (1 + rank). ts_headline extracts the bounded-width
        // snippet with match markers.
        let sql = format!(
            r#"
            SELECT entry_id, conversation_id, conversation_group_id,
                   ts_rank_cd(content_tsvector, websearch_to_tsquery('english', $1)) AS rank,
                   ts_headline('english', indexed_text,
                               websearch_to_tsquery('english', $1),
                               'StartSel=<mark>, StopSel=</mark>, MaxWords=30, MinWords=5') AS highlight
            FROM {}
            WHERE {}
              AND content_tsvector @@ websearch_to_tsquery('english', $1)
            ORDER BY rank DESC, created_at DESC, entry_id ASC
            LIMIT ${}
            "#,
            self.table_name, scope_clause, limit_param
        );

        let mut q = sqlx::query(&sql).bind(query).bind(&scope.group_ids);
        if let Some(conversation_ids) = &scope.conversation_ids {
            q = q.bind(conversation_ids);
        }
        q = q.bind(limit);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f32 = row.get("rank");
                VectorHit {
                    entry_id: row.get("entry_id"),
                    conversation_id: row.get("conversation_id"),
                    conversation_group_id: row.get("conversation_group_id"),
                    score: (rank as f64) / (1.0 + rank as f64),
                    highlight: row.get("highlight"),
                }
            })
            .collect())
    }

    fn is_semantic_search_available(&self) -> bool {
        true
    }

    fn is_full_text_search_available(&self) -> bool {
        true
    }

    async fn ensure_schema(&self) -> VectorStoreResult<()> {
        let statements = [
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    entry_id UUID PRIMARY KEY,
                    conversation_id UUID NOT NULL,
                    conversation_group_id UUID NOT NULL,
                    embedding vector({}),
                    content_tsvector TSVECTOR,
                    indexed_text TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.table_name, self.dimensions
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_group_idx ON {} (conversation_group_id)",
                self.table_name, self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
                self.table_name, self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_tsvector_idx ON {} USING GIN (content_tsvector)",
                self.table_name, self.table_name
            ),
        ];
        for sql in statements {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_formats_pgvector_syntax() {
        assert_eq!(PgvectorStore::vector_literal(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
        assert_eq!(PgvectorStore::vector_literal(&[]), "[]");
    }
}
