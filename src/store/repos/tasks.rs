use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{models::TaskStatus, store::error::StoreResult};

/// A queued-task row.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: Uuid,
    pub task_type: String,
    pub name: Option<String>,
    pub body: serde_json::Value,
    pub status: TaskStatus,
    pub attempts: i32,
    pub available_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    /// Enqueue a task. When `name` is set and a non-terminal task with
    /// the same name exists, returns the existing id instead of inserting
    /// (idempotent singleton). Safe under concurrent enqueues.
    async fn enqueue(
        &self,
        task_type: &str,
        name: Option<&str>,
        body: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> StoreResult<Uuid>;

    /// Atomically claim up to `limit` due pending tasks, marking them
    /// PROCESSING and stamping `processing_at`. Two workers never claim
    /// the same task.
    async fn claim(&self, limit: u32, now: DateTime<Utc>) -> StoreResult<Vec<TaskRow>>;

    /// Delete a completed task.
    async fn complete(&self, id: Uuid) -> StoreResult<()>;

    /// Re-arm a failed task: status PENDING, `available_at` pushed out,
    /// attempts incremented.
    async fn fail(&self, id: Uuid, retry_at: DateTime<Utc>) -> StoreResult<()>;

    /// Mark a task permanently failed.
    async fn mark_dead(&self, id: Uuid) -> StoreResult<()>;

    /// Reset tasks stuck in PROCESSING since before the cutoff back to
    /// PENDING. Returns rows reset.
    async fn reap_stuck(&self, stuck_before: DateTime<Utc>) -> StoreResult<u64>;

    /// Fetch a task by id. Test and admin introspection.
    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<TaskRow>>;

    /// Count non-terminal tasks of a type. Test introspection.
    async fn count_active(&self, task_type: &str) -> StoreResult<i64>;
}
