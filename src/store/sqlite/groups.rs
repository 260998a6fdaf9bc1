use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_metadata, parse_uuid, placeholders};
use crate::{
    models::{AdminGroupFilter, TASK_VECTOR_STORE_DELETE},
    store::{
        error::{StoreError, StoreResult},
        repos::{Cursor, GroupRepo, GroupRow, ListParams, ListResult},
    },
};

pub struct SqliteGroupRepo {
    pool: SqlitePool,
}

impl SqliteGroupRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_group(row: &SqliteRow) -> StoreResult<GroupRow> {
        let metadata: String = row.get("metadata");
        Ok(GroupRow {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            owner_user_id: row.get("owner_user_id"),
            title: row.get("title"),
            metadata: parse_metadata(&metadata)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }
}

#[async_trait]
impl GroupRepo for SqliteGroupRepo {
    async fn create(&self, row: &GroupRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_groups
                (id, owner_user_id, title, metadata, created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(&row.owner_user_id)
        .bind(&row.title)
        .bind(serde_json::to_string(&row.metadata)?)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<GroupRow>> {
        let row = sqlx::query("SELECT * FROM conversation_groups WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn set_title_if_unset(&self, id: Uuid, title: &[u8]) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE conversation_groups SET title = ?, updated_at = ? WHERE id = ? AND title IS NULL",
        )
        .bind(title)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update(
        &self,
        id: Uuid,
        title: Option<&[u8]>,
        metadata: Option<&Map<String, serde_json::Value>>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversation_groups
            SET title = COALESCE(?, title),
                metadata = COALESCE(?, metadata),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(metadata.map(serde_json::to_string).transpose()?)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE conversation_groups SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            "UPDATE conversations SET deleted_at = ?, updated_at = ? WHERE conversation_group_id = ? AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        // Memberships are access control, not content: hard-delete.
        sqlx::query("DELETE FROM conversation_memberships WHERE conversation_group_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM ownership_transfers WHERE conversation_group_id = ? AND status = 'pending'",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists =
            sqlx::query("SELECT deleted_at IS NOT NULL AS deleted FROM conversation_groups WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(row) = exists else {
            return Err(StoreError::NotFound);
        };
        let deleted: bool = row.get("deleted");
        if !deleted {
            return Err(StoreError::Conflict(
                "conversation group is not deleted".to_string(),
            ));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE conversation_groups SET deleted_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE conversations SET deleted_at = NULL, updated_at = ? WHERE conversation_group_id = ?",
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_admin(
        &self,
        filter: &AdminGroupFilter,
        params: &ListParams,
    ) -> StoreResult<ListResult<GroupRow>> {
        let limit = params.limit.unwrap_or(50);

        let mut sql = String::from("SELECT * FROM conversation_groups WHERE 1 = 1");
        if let Some(_user) = &filter.user_id {
            sql.push_str(" AND owner_user_id = ?");
        }
        if filter.only_deleted {
            sql.push_str(" AND deleted_at IS NOT NULL");
        } else if !filter.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if filter.deleted_after.is_some() {
            // Inclusive start.
            sql.push_str(" AND deleted_at >= ?");
        }
        if filter.deleted_before.is_some() {
            // Exclusive end.
            sql.push_str(" AND deleted_at < ?");
        }
        if params.after.is_some() {
            sql.push_str(" AND (created_at, id) > (?, ?)");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(user) = &filter.user_id {
            query = query.bind(user);
        }
        if let Some(after) = filter.deleted_after {
            query = query.bind(after);
        }
        if let Some(before) = filter.deleted_before {
            query = query.bind(before);
        }
        if let Some(cursor) = &params.after {
            query = query.bind(cursor.created_at).bind(cursor.id.to_string());
        }
        query = query.bind(limit + 1);

        let rows = query.fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(Self::row_to_group)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(ListResult::from_overfetch(items, limit, |g| {
            Cursor::new(g.created_at, g.id)
        }))
    }

    async fn count_evictable(&self, cutoff: DateTime<Utc>) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM conversation_groups WHERE deleted_at IS NOT NULL AND deleted_at < ?",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn evict_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let candidates = sqlx::query(
            "SELECT id FROM conversation_groups WHERE deleted_at IS NOT NULL AND deleted_at < ? LIMIT ?",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        let ids: Vec<String> = candidates.iter().map(|r| r.get("id")).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Vector cleanup is enqueued before the group rows are removed.
        // The singleton name dedupes concurrent eviction passes.
        let now = Utc::now();
        for id in &ids {
            sqlx::query(
                r#"
                INSERT INTO tasks (id, task_type, name, body, status, attempts, available_at, created_at)
                VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(TASK_VECTOR_STORE_DELETE)
            .bind(format!("{}:{}", TASK_VECTOR_STORE_DELETE, id))
            .bind(serde_json::json!({ "conversationGroupId": id }).to_string())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Children first, then the group rows.
        let marks = placeholders(ids.len());
        for table in [
            "entries",
            "conversations",
            "conversation_memberships",
            "ownership_transfers",
        ] {
            let sql = format!(
                "DELETE FROM {} WHERE conversation_group_id IN ({})",
                table, marks
            );
            let mut query = sqlx::query(&sql);
            for id in &ids {
                query = query.bind(id);
            }
            query.execute(&mut *tx).await?;
        }

        let sql = format!(
            "DELETE FROM conversation_groups WHERE id IN ({}) AND deleted_at IS NOT NULL AND deleted_at < ? RETURNING id",
            marks
        );
        let mut query = sqlx::query(&sql);
        for id in &ids {
            query = query.bind(id);
        }
        query = query.bind(cutoff);
        let deleted = query.fetch_all(&mut *tx).await?;

        tx.commit().await?;

        deleted
            .iter()
            .map(|r| parse_uuid(&r.get::<String, _>("id")))
            .collect()
    }
}
