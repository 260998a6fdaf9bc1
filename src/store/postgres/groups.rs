use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::common::metadata_from_value;
use crate::{
    models::TASK_VECTOR_STORE_DELETE,
    store::{
        error::{StoreError, StoreResult},
        repos::{Cursor, GroupRepo, GroupRow, ListParams, ListResult},
    },
};

pub struct PostgresGroupRepo {
    pool: PgPool,
}

impl PostgresGroupRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_group(row: &PgRow) -> StoreResult<GroupRow> {
        Ok(GroupRow {
            id: row.get("id"),
            owner_user_id: row.get("owner_user_id"),
            title: row.get("title"),
            metadata: metadata_from_value(row.get("metadata"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }
}

#[async_trait]
impl GroupRepo for PostgresGroupRepo {
    async fn create(&self, row: &GroupRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_groups
                (id, owner_user_id, title, metadata, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id)
        .bind(&row.owner_user_id)
        .bind(&row.title)
        .bind(serde_json::Value::Object(row.metadata.clone()))
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.deleted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<GroupRow>> {
        let row = sqlx::query("SELECT * FROM conversation_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn set_title_if_unset(&self, id: Uuid, title: &[u8]) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE conversation_groups SET title = $1, updated_at = $2 WHERE id = $3 AND title IS NULL",
        )
        .bind(title)
        .bind(Utc::now())
        .bind(id)
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
            SET title = COALESCE($1, title),
                metadata = COALESCE($2, metadata),
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(title)
        .bind(metadata.map(|m| serde_json::Value::Object(m.clone())))
        .bind(Utc::now())
        .bind(id)
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
            "UPDATE conversation_groups SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            "UPDATE conversations SET deleted_at = $1, updated_at = $1 WHERE conversation_group_id = $2 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Memberships are access control, not content: hard-delete.
        sqlx::query("DELETE FROM conversation_memberships WHERE conversation_group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM ownership_transfers WHERE conversation_group_id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT deleted_at FROM conversation_groups WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };
        let deleted_at: Option<DateTime<Utc>> = row.get("deleted_at");
        if deleted_at.is_none() {
            return Err(StoreError::Conflict(
                "conversation group is not deleted".to_string(),
            ));
        }

        let now = Utc::now();
        sqlx::query("UPDATE conversation_groups SET deleted_at = NULL, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE conversations SET deleted_at = NULL, updated_at = $1 WHERE conversation_group_id = $2",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_admin(
        &self,
        filter: &crate::models::AdminGroupFilter,
        params: &ListParams,
    ) -> StoreResult<ListResult<GroupRow>> {
        let limit = params.limit.unwrap_or(50);

        let mut sql = String::from("SELECT * FROM conversation_groups WHERE TRUE");
        let mut idx = 0u32;

        if filter.user_id.is_some() {
            idx += 1;
            sql.push_str(&format!(" AND owner_user_id = ${}", idx));
        }
        if filter.only_deleted {
            sql.push_str(" AND deleted_at IS NOT NULL");
        } else if !filter.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if filter.deleted_after.is_some() {
            // Inclusive start.
            idx += 1;
            sql.push_str(&format!(" AND deleted_at >= ${}", idx));
        }
        if filter.deleted_before.is_some() {
            // Exclusive end.
            idx += 1;
            sql.push_str(&format!(" AND deleted_at < ${}", idx));
        }
        if params.after.is_some() {
            sql.push_str(&format!(
                " AND ROW(created_at, id) > ROW(${}, ${})",
                idx + 1,
                idx + 2
            ));
            idx += 2;
        }
        idx += 1;
        sql.push_str(&format!(" ORDER BY created_at ASC, id ASC LIMIT ${}", idx));

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
            query = query.bind(cursor.created_at).bind(cursor.id);
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
            "SELECT COUNT(*) AS n FROM conversation_groups WHERE deleted_at IS NOT NULL AND deleted_at < $1",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn evict_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        // Skip-locked claim keeps concurrent eviction passes disjoint.
        let rows = sqlx::query(
            r#"
            SELECT id FROM conversation_groups
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Vector cleanup is enqueued before the group rows are removed.
        let now = Utc::now();
        for id in &ids {
            sqlx::query(
                r#"
                INSERT INTO tasks (id, task_type, name, body, status, attempts, available_at, created_at)
                VALUES ($1, $2, $3, $4, 'pending', 0, $5, $5)
                ON CONFLICT (name) WHERE name IS NOT NULL AND status IN ('pending', 'processing')
                DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(TASK_VECTOR_STORE_DELETE)
            .bind(format!("{}:{}", TASK_VECTOR_STORE_DELETE, id))
            .bind(serde_json::json!({ "conversationGroupId": id }))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Children are removed by ON DELETE CASCADE.
        sqlx::query("DELETE FROM conversation_groups WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ids)
    }
}
