use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_enum, parse_uuid};
use crate::store::{
    error::{StoreError, StoreResult},
    repos::{TaskRepo, TaskRow},
};

pub struct SqliteTaskRepo {
    pool: SqlitePool,
}

impl SqliteTaskRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> StoreResult<TaskRow> {
        let body: String = row.get("body");
        Ok(TaskRow {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            task_type: row.get("task_type"),
            name: row.get("name"),
            body: serde_json::from_str(&body).map_err(|e| StoreError::Internal(e.to_string()))?,
            status: parse_enum(&row.get::<String, _>("status"))?,
            attempts: row.get("attempts"),
            available_at: row.get("available_at"),
            processing_at: row.get("processing_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl TaskRepo for SqliteTaskRepo {
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
                VALUES (?, ?, ?, ?, 'pending', 0, ?, ?)
                ON CONFLICT DO NOTHING
                RETURNING id
                "#,
            )
            .bind(id.to_string())
            .bind(task_type)
            .bind(name)
            .bind(body.to_string())
            .bind(available_at)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

            if inserted.is_some() {
                return Ok(id);
            }

            let existing = sqlx::query(
                "SELECT id FROM tasks WHERE name = ? AND status IN ('pending', 'processing')",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = existing {
                return parse_uuid(&row.get::<String, _>("id"));
            }
        }
        Err(StoreError::Internal(
            "task enqueue lost two insert races".to_string(),
        ))
    }

    async fn claim(&self, limit: u32, now: DateTime<Utc>) -> StoreResult<Vec<TaskRow>> {
        // A single UPDATE is atomic under SQLite's writer lock, which
        // stands in for FOR UPDATE SKIP LOCKED.
        let rows = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'processing', processing_at = ?
            WHERE id IN (
                SELECT id FROM tasks
                WHERE status = 'pending' AND available_at <= ?
                ORDER BY available_at ASC
                LIMIT ?
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn complete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, retry_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending', available_at = ?, processing_at = NULL,
                attempts = attempts + 1
            WHERE id = ?
            "#,
        )
        .bind(retry_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dead(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'failed', processing_at = NULL, attempts = attempts + 1 WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reap_stuck(&self, stuck_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending', processing_at = NULL
            WHERE status = 'processing' AND processing_at < ?
            "#,
        )
        .bind(stuck_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<TaskRow>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn count_active(&self, task_type: &str) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM tasks WHERE task_type = ? AND status IN ('pending', 'processing')",
        )
        .bind(task_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}
