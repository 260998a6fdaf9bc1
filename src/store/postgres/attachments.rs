use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::common::parse_enum;
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{AttachmentRepo, AttachmentRow},
};

pub struct PostgresAttachmentRepo {
    pool: PgPool,
}

impl PostgresAttachmentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_attachment(row: &PgRow) -> StoreResult<AttachmentRow> {
        Ok(AttachmentRow {
            id: row.get("id"),
            entry_id: row.get("entry_id"),
            status: parse_enum(&row.get::<String, _>("status"))?,
            content_type: row.get("content_type"),
            size_bytes: row.get("size_bytes"),
            sha256: row.get("sha256"),
            storage_key: row.get("storage_key"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl AttachmentRepo for PostgresAttachmentRepo {
    async fn create(&self, row: &AttachmentRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attachments
                (id, entry_id, status, content_type, size_bytes, sha256,
                 storage_key, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.id)
        .bind(row.entry_id)
        .bind(row.status.as_str())
        .bind(&row.content_type)
        .bind(row.size_bytes)
        .bind(&row.sha256)
        .bind(&row.storage_key)
        .bind(row.expires_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<AttachmentRow>> {
        let row = sqlx::query("SELECT * FROM attachments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_attachment).transpose()
    }

    async fn mark_ready(
        &self,
        id: Uuid,
        size_bytes: i64,
        sha256: &str,
        storage_key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE attachments
            SET status = 'ready', size_bytes = $1, sha256 = $2, storage_key = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(size_bytes)
        .bind(sha256)
        .bind(storage_key)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE attachments SET status = 'failed', updated_at = $1 WHERE id = $2")
                .bind(at)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn link(&self, id: Uuid, entry_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE attachments
            SET entry_id = $1, status = 'linked', expires_at = NULL, updated_at = $2
            WHERE id = $3 AND entry_id IS NULL AND status = 'ready'
            "#,
        )
        .bind(entry_id)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(
                "attachment is not ready or already linked".to_string(),
            ));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<Option<AttachmentRow>> {
        let row = sqlx::query("DELETE FROM attachments WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_attachment).transpose()
    }

    async fn list_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<AttachmentRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM attachments
            WHERE entry_id IS NULL AND expires_at IS NOT NULL AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_attachment).collect()
    }
}
