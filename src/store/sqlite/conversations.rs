use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_metadata, parse_opt_uuid, parse_uuid};
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{ConversationRepo, ConversationRow, Cursor, ListParams, ListResult},
};

pub struct SqliteConversationRepo {
    pool: SqlitePool,
}

impl SqliteConversationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_conversation(row: &SqliteRow) -> StoreResult<ConversationRow> {
        let metadata: String = row.get("metadata");
        Ok(ConversationRow {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            conversation_group_id: parse_uuid(&row.get::<String, _>("conversation_group_id"))?,
            forked_at_conversation_id: parse_opt_uuid(row.get("forked_at_conversation_id"))?,
            forked_at_entry_id: parse_opt_uuid(row.get("forked_at_entry_id"))?,
            metadata: parse_metadata(&metadata)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }
}

#[async_trait]
impl ConversationRepo for SqliteConversationRepo {
    async fn create(&self, row: &ConversationRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations
                (id, conversation_group_id, forked_at_conversation_id, forked_at_entry_id,
                 metadata, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.conversation_group_id.to_string())
        .bind(row.forked_at_conversation_id.map(|u| u.to_string()))
        .bind(row.forked_at_entry_id.map(|u| u.to_string()))
        .bind(serde_json::to_string(&row.metadata)?)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<ConversationRow>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list_by_group(
        &self,
        group_id: Uuid,
        include_deleted: bool,
    ) -> StoreResult<Vec<ConversationRow>> {
        let deleted_filter = if include_deleted {
            ""
        } else {
            "AND deleted_at IS NULL"
        };
        let sql = format!(
            "SELECT * FROM conversations WHERE conversation_group_id = ? {} ORDER BY created_at ASC, id ASC",
            deleted_filter
        );
        let rows = sqlx::query(&sql)
            .bind(group_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn latest_in_group(&self, group_id: Uuid) -> StoreResult<Option<ConversationRow>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE conversation_group_id = ? AND deleted_at IS NULL
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        params: &ListParams,
    ) -> StoreResult<ListResult<ConversationRow>> {
        let limit = params.limit.unwrap_or(50);

        let cursor_filter = if params.after.is_some() {
            "AND (c.updated_at, c.id) < (?, ?)"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT c.* FROM conversations c
            JOIN conversation_memberships m
              ON m.conversation_group_id = c.conversation_group_id
            WHERE m.user_id = ? AND m.deleted_at IS NULL AND c.deleted_at IS NULL
            {}
            ORDER BY c.updated_at DESC, c.id DESC
            LIMIT ?
            "#,
            cursor_filter
        );

        let mut query = sqlx::query(&sql).bind(user_id);
        if let Some(cursor) = &params.after {
            query = query.bind(cursor.created_at).bind(cursor.id.to_string());
        }
        query = query.bind(limit + 1);

        let rows = query.fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_conversation)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(ListResult::from_overfetch(items, limit, |c| {
            Cursor::new(c.updated_at, c.id)
        }))
    }

    async fn update_metadata(
        &self,
        id: Uuid,
        metadata: &Map<String, serde_json::Value>,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE conversations SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(metadata)?)
            .bind(at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
