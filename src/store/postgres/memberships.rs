use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::common::parse_enum;
use crate::store::{
    error::StoreResult,
    repos::{MembershipRepo, MembershipRow},
};

pub struct PostgresMembershipRepo {
    pool: PgPool,
}

impl PostgresMembershipRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_membership(row: &PgRow) -> StoreResult<MembershipRow> {
        Ok(MembershipRow {
            conversation_group_id: row.get("conversation_group_id"),
            user_id: row.get("user_id"),
            access_level: parse_enum(&row.get::<String, _>("access_level"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }
}

#[async_trait]
impl MembershipRepo for PostgresMembershipRepo {
    async fn upsert(
        &self,
        group_id: Uuid,
        user_id: &str,
        level: crate::models::AccessLevel,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_memberships
                (conversation_group_id, user_id, access_level, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $4, NULL)
            ON CONFLICT (conversation_group_id, user_id)
            DO UPDATE SET access_level = EXCLUDED.access_level,
                          updated_at = EXCLUDED.updated_at,
                          deleted_at = NULL
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(level.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, group_id: Uuid, user_id: &str) -> StoreResult<Option<MembershipRow>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM conversation_memberships
            WHERE conversation_group_id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_membership).transpose()
    }

    async fn list_by_group(&self, group_id: Uuid) -> StoreResult<Vec<MembershipRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversation_memberships
            WHERE conversation_group_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC, user_id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_membership).collect()
    }

    async fn revoke(&self, group_id: Uuid, user_id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversation_memberships
            SET deleted_at = $1, updated_at = $1
            WHERE conversation_group_id = $2 AND user_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn accessible_group_ids(&self, user_id: &str) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT m.conversation_group_id AS gid
            FROM conversation_memberships m
            JOIN conversation_groups g ON g.id = m.conversation_group_id
            WHERE m.user_id = $1 AND m.deleted_at IS NULL AND g.deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("gid")).collect())
    }

    async fn count_evictable(&self, cutoff: DateTime<Utc>) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM conversation_memberships WHERE deleted_at IS NOT NULL AND deleted_at < $1",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    async fn evict_batch(&self, cutoff: DateTime<Utc>, limit: u32) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM conversation_memberships
            WHERE (conversation_group_id, user_id) IN (
                SELECT conversation_group_id, user_id FROM conversation_memberships
                WHERE deleted_at IS NOT NULL AND deleted_at < $1
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
