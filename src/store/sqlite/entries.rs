use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{Cursor, EntryRepo, EntryRow, ListParams, ListResult},
};

pub struct SqliteEntryRepo {
    pool: SqlitePool,
}

impl SqliteEntryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &SqliteRow) -> StoreResult<EntryRow> {
        Ok(EntryRow {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            conversation_id: parse_uuid(&row.get::<String, _>("conversation_id"))?,
            conversation_group_id: parse_uuid(&row.get::<String, _>("conversation_group_id"))?,
            channel: row.get("channel"),
            client_id: row.get("client_id"),
            content_type: row.get("content_type"),
            content: row.get("content"),
            indexed_content: row.get("indexed_content"),
            indexed_at: row.get("indexed_at"),
            epoch: row.get("epoch"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl EntryRepo for SqliteEntryRepo {
    async fn insert(&self, row: &EntryRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entries
                (id, conversation_id, conversation_group_id, channel, client_id,
                 content_type, content, indexed_content, indexed_at, epoch, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.conversation_id.to_string())
        .bind(row.conversation_group_id.to_string())
        .bind(&row.channel)
        .bind(&row.client_id)
        .bind(&row.content_type)
        .bind(&row.content)
        .bind(&row.indexed_content)
        .bind(row.indexed_at)
        .bind(row.epoch)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, group_id: Uuid, id: Uuid) -> StoreResult<Option<EntryRow>> {
        let row = sqlx::query("SELECT * FROM entries WHERE conversation_group_id = ? AND id = ?")
            .bind(group_id.to_string())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn list_by_conversation(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
    ) -> StoreResult<Vec<EntryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM entries
            WHERE conversation_group_id = ? AND conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(group_id.to_string())
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn list_by_group(&self, group_id: Uuid) -> StoreResult<Vec<EntryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM entries
            WHERE conversation_group_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn list_memory(
        &self,
        group_id: Uuid,
        conversation_id: Uuid,
        client_id: &str,
    ) -> StoreResult<Vec<EntryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM entries
            WHERE conversation_group_id = ? AND conversation_id = ?
              AND channel = 'MEMORY' AND client_id = ?
            ORDER BY epoch ASC, created_at ASC, id ASC
            "#,
        )
        .bind(group_id.to_string())
        .bind(conversation_id.to_string())
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn set_indexed_content(
        &self,
        group_id: Uuid,
        entry_id: Uuid,
        text: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE entries SET indexed_content = ?, indexed_at = NULL WHERE conversation_group_id = ? AND id = ?",
        )
        .bind(text)
        .bind(group_id.to_string())
        .bind(entry_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_indexed_at(
        &self,
        group_id: Uuid,
        entry_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE entries SET indexed_at = ? WHERE conversation_group_id = ? AND id = ?",
        )
        .bind(at)
        .bind(group_id.to_string())
        .bind(entry_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_missing_indexed_content(
        &self,
        params: &ListParams,
    ) -> StoreResult<ListResult<EntryRow>> {
        let limit = params.limit.unwrap_or(50);

        let cursor_filter = if params.after.is_some() {
            "AND (created_at, id) > (?, ?)"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT * FROM entries
            WHERE channel = 'HISTORY' AND indexed_content IS NULL
            {}
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
            cursor_filter
        );

        let mut query = sqlx::query(&sql);
        if let Some(cursor) = &params.after {
            query = query.bind(cursor.created_at).bind(cursor.id.to_string());
        }
        query = query.bind(limit + 1);

        let rows = query.fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(ListResult::from_overfetch(items, limit, |e| {
            Cursor::new(e.created_at, e.id)
        }))
    }

    async fn list_pending_index(&self, limit: i64) -> StoreResult<Vec<EntryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM entries
            WHERE indexed_content IS NOT NULL AND indexed_at IS NULL
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_entry).collect()
    }
}
