use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_enum, parse_opt_uuid, parse_uuid};
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{AttachmentRepo, AttachmentRow},
};

pub struct SqliteAttachmentRepo {
    pool: SqlitePool,
}

impl SqliteAttachmentRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_attachment(row: &SqliteRow) -> StoreResult<AttachmentRow> {
        Ok(AttachmentRow {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            entry_id: parse_opt_uuid(row.get("entry_id"))?,
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
impl AttachmentRepo for SqliteAttachmentRepo {
    async fn create(&self, row: &AttachmentRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attachments
                (id, entry_id, status, content_type, size_bytes, sha256,
                 storage_key, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.entry_id.map(|u| u.to_string()))
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
        let row = sqlx::query("SELECT * FROM attachments WHERE id = ?")
            .bind(id.to_string())
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
            SET status = 'ready', size_bytes = ?, sha256 = ?, storage_key = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(size_bytes)
        .bind(sha256)
        .bind(storage_key)
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE attachments SET status = 'failed', updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(id.to_string())
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
            SET entry_id = ?, status = 'linked', expires_at = NULL, updated_at = ?
            WHERE id = ? AND entry_id IS NULL AND status = 'ready'
            "#,
        )
        .bind(entry_id.to_string())
        .bind(at)
        .bind(id.to_string())
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
        let row = sqlx::query("DELETE FROM attachments WHERE id = ? RETURNING *")
            .bind(id.to_string())
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
            WHERE entry_id IS NULL AND expires_at IS NOT NULL AND expires_at < ?
            ORDER BY expires_at ASC
            LIMIT ?
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_attachment).collect()
    }
}
