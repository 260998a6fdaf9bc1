use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::common::metadata_from_value;
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{ConversationRepo, ConversationRow, Cursor, ListParams, ListResult},
};

pub struct PostgresConversationRepo {
    pool: PgPool,
}

impl PostgresConversationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_conversation(row: &PgRow) -> StoreResult<ConversationRow> {
        Ok(ConversationRow {
            id: row.get("id"),
            conversation_group_id: row.get("conversation_group_id"),
            forked_at_conversation_id: row.get("forked_at_conversation_id"),
            forked_at_entry_id: row.get("forked_at_entry_id"),
            metadata: metadata_from_value(row.get("metadata"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }
}

#[async_trait]
impl ConversationRepo for PostgresConversationRepo {
    async fn create(&self, row: &ConversationRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations
                (id, conversation_group_id, forked_at_conversation_id, forked_at_entry_id,
                 metadata, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.id)
        .bind(row.conversation_group_id)
        .bind(row.forked_at_conversation_id)
        .bind(row.forked_at_entry_id)
        .bind(serde_json::Value::Object(row.metadata.clone()))
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<ConversationRow>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
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
            "SELECT * FROM conversations WHERE conversation_group_id = $1 {} ORDER BY created_at ASC, id ASC",
            deleted_filter
        );
        let rows = sqlx::query(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn latest_in_group(&self, group_id: Uuid) -> StoreResult<Option<ConversationRow>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE conversation_group_id = $1 AND deleted_at IS NULL
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(group_id)
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
            "AND ROW(c.updated_at, c.id) < ROW($2, $3)"
        } else {
            ""
        };
        let limit_param = if params.after.is_some() { "$4" } else { "$2" };
        let sql = format!(
            r#"
            SELECT c.* FROM conversations c
            JOIN conversation_memberships m
              ON m.conversation_group_id = c.conversation_group_id
            WHERE m.user_id = $1 AND m.deleted_at IS NULL AND c.deleted_at IS NULL
            {}
            ORDER BY c.updated_at DESC, c.id DESC
            LIMIT {}
            "#,
            cursor_filter, limit_param
        );

        let mut query = sqlx::query(&sql).bind(user_id);
        if let Some(cursor) = &params.after {
            query = query.bind(cursor.created_at).bind(cursor.id);
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
        let result =
            sqlx::query("UPDATE conversations SET metadata = $1, updated_at = $2 WHERE id = $3")
                .bind(serde_json::Value::Object(metadata.clone()))
                .bind(at)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
