use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::common::parse_enum;
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{TaskRepo, TaskRow},
};

pub struct PostgresTaskRepo {
    pool: PgPool,
}

impl PostgresTaskRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &PgRow) -> StoreResult<TaskRow> {
        Ok(TaskRow {
            id: row.get("id"),
            task_type: row.get("task_type"),
            name: row.get("name"),
            body: row.get("body"),
            status: parse_enum(&row.get::<String, _>("status"))?,
            attempts: row.get("attempts"),
            available_at: row.get("available_at"),
            processing_at: row.get("processing_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl TaskRepo for PostgresTaskRepo {
    async fn enqueue(
        &self,
        task_type: &str,
        name: Option<&str>,
        body: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> StoreResult<Uuid> {
        // Two rounds cover the race where the existing singleton finishes
        // between the conflicting insert and the lookup.
        for _ in 0..2 {
            let id = Uuid::new_v4();
            let inserted = sqlx::query(
                r#"
                INSERT INTO tasks (id, task_type, name, body, status, attempts, available_at, created_at)
                VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6)
                ON CONFLICT (name) WHERE name IS NOT NULL AND status IN ('pending', 'processing')
                DO NOTHING
                RETURNING id
                "#,
            )
            .bind(id)
            .bind(task_type)
            .bind(name)
            .bind(&body)
            .bind(available_at)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

            if inserted.is_some() {
                return Ok(id);
            }

            let existing = sqlx::query(
                "SELECT id FROM tasks WHERE name = $1 AND status IN ('pending', 'processing')",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = existing {
                return Ok(row.get("id"));
            }
        }
        Err(StoreError::Internal(
            "task enqueue lost two insert races".to_string(),
        ))
    }

    async fn claim(&self, limit: u32, now: DateTime<Utc>) -> StoreResult<Vec<TaskRow>> {
        let rows = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'processing', processing_at = $1
            WHERE id IN (
                SELECT id FROM tasks
                WHERE status = 'pending' AND available_at <= $1
                ORDER BY available_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, retry_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending', available_at = $1, processing_at = NULL,
                attempts = attempts + 1
            WHERE id = $2
            "#,
        )
        .bind(retry_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dead(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'failed', processing_at = NULL, attempts = attempts + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reap_stuck(&self, stuck_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending', processing_at = NULL
            WHERE status = 'processing' AND processing_at < $1
            "#,
        )
        .bind(stuck_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<TaskRow>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn count_active(&self, task_type: &str) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM tasks WHERE task_type = $1 AND status IN ('pending', 'processing')",
        )
        .bind(task_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}
