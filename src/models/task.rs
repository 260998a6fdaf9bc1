use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task type for bulk vector cleanup of an evicted conversation group.
pub const TASK_VECTOR_STORE_DELETE: &str = "vector_store_delete";

/// Singleton task type that retries vector indexing for entries left
/// unindexed by write-path failures.
pub const TASK_VECTOR_STORE_INDEX_RETRY: &str = "vector_store_index_retry";

/// Status of a queued background task.
///
/// Failed tasks that will retry are re-armed to `Pending` with a future
/// `available_at`; `Failed` is terminal (dead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A queued background task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: String,
    /// Singleton key: at most one non-terminal task carries a given name.
    pub name: Option<String>,
    pub body: serde_json::Value,
    pub status: TaskStatus,
    pub attempts: i32,
    pub available_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a task handler invocation.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Handler succeeded; delete the task.
    Done,
    /// Transient failure; re-arm after the given delay.
    Retry(String),
    /// Permanent failure; mark the task dead.
    Dead(String),
}
