use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::TasksConfig,
    models::{TASK_VECTOR_STORE_DELETE, TASK_VECTOR_STORE_INDEX_RETRY, TaskOutcome},
    search::{SearchCoordinator, VectorStore},
    store::{StorePool, TaskRow},
};

/// Dispatches claimed tasks to their handlers.
pub struct TaskHandlers {
    store: Arc<StorePool>,
    vector: Option<Arc<dyn VectorStore>>,
    search: Arc<SearchCoordinator>,
}

impl TaskHandlers {
    pub fn new(
        store: Arc<StorePool>,
        vector: Option<Arc<dyn VectorStore>>,
        search: Arc<SearchCoordinator>,
    ) -> Self {
        Self {
            store,
            vector,
            search,
        }
    }

    pub async fn dispatch(&self, task: &TaskRow) -> TaskOutcome {
        match task.task_type.as_str() {
            TASK_VECTOR_STORE_DELETE => self.handle_vector_delete(task).await,
            TASK_VECTOR_STORE_INDEX_RETRY => self.handle_index_retry().await,
            other => TaskOutcome::Dead(format!("unknown task type: {}", other)),
        }
    }

    async fn handle_vector_delete(&self, task: &TaskRow) -> TaskOutcome {
        let Some(group_id) = task
            .body
            .get("conversationGroupId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return TaskOutcome::Dead("missing conversationGroupId in task body".to_string());
        };

        let Some(vector) = &self.vector else {
            // No vector backend: nothing to clean up.
            return TaskOutcome::Done;
        };
        match vector.delete_by_group(group_id).await {
            Ok(removed) => {
                tracing::debug!(group_id = %group_id, removed, "vector store cleanup complete");
                TaskOutcome::Done
            }
            Err(e) => TaskOutcome::Retry(format!("vector delete failed: {}", e)),
        }
    }

    async fn handle_index_retry(&self) -> TaskOutcome {
        match self.search.run_index_retry().await {
            Ok(result) => {
                tracing::debug!(
                    indexed = result.indexed,
                    failed = result.failed,
                    remaining = result.remaining,
                    "index retry pass complete"
                );
                if result.failed > 0 {
                    TaskOutcome::Retry(format!("{} entries failed to index", result.failed))
                } else {
                    TaskOutcome::Done
                }
            }
            Err(e) => TaskOutcome::Retry(format!("index retry pass failed: {}", e)),
        }
    }

    /// Settle a claimed task according to its handler outcome.
    async fn settle(&self, task: &TaskRow, outcome: TaskOutcome, config: &TasksConfig) {
        let result = match outcome {
            TaskOutcome::Done => self.store.tasks().complete(task.id).await,
            TaskOutcome::Retry(reason) => {
                if task.attempts + 1 >= config.max_attempts {
                    tracing::error!(
                        task_id = %task.id,
                        task_type = %task.task_type,
                        attempts = task.attempts,
                        reason = %reason,
                        "task exhausted retries, marking dead"
                    );
                    self.store.tasks().mark_dead(task.id).await
                } else {
                    tracing::warn!(
                        task_id = %task.id,
                        task_type = %task.task_type,
                        reason = %reason,
                        "task failed, re-arming"
                    );
                    self.store
                        .tasks()
                        .fail(
                            task.id,
                            Utc::now() + Duration::seconds(config.retry_delay_secs as i64),
                        )
                        .await
                }
            }
            TaskOutcome::Dead(reason) => {
                tracing::error!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    reason = %reason,
                    "task permanently failed"
                );
                self.store.tasks().mark_dead(task.id).await
            }
        };
        if let Err(e) = result {
            tracing::error!(task_id = %task.id, error = %e, "failed to settle task");
        }
    }
}

/// Start the worker pool plus the stuck-processing reaper. Workers run
/// until the cancellation token fires.
pub fn start_task_workers(
    handlers: Arc<TaskHandlers>,
    store: Arc<StorePool>,
    config: TasksConfig,
    shutdown: CancellationToken,
    tracker: &tokio_util::task::TaskTracker,
) {
    for worker_id in 0..config.worker_count {
        let handlers = Arc::clone(&handlers);
        let store = Arc::clone(&store);
        let config = config.clone();
        let shutdown = shutdown.clone();
        tracker.spawn(async move {
            tracing::info!(worker_id, "task worker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = run_one_poll(&handlers, &store, &config) => {}
                }
            }
            tracing::info!(worker_id, "task worker stopped");
        });
    }

    // One reaper per process resets tasks stuck in PROCESSING.
    let reaper_store = store;
    let reaper_config = config;
    tracker.spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(reaper_config.stuck_after()) => {
                    let cutoff = Utc::now()
                        - Duration::seconds(reaper_config.stuck_after_secs as i64);
                    match reaper_store.tasks().reap_stuck(cutoff).await {
                        Ok(0) => {}
                        Ok(reset) => tracing::warn!(reset, "reset stuck tasks to pending"),
                        Err(e) => tracing::error!(error = %e, "stuck-task reaper failed"),
                    }
                }
            }
        }
    });
}

async fn run_one_poll(handlers: &TaskHandlers, store: &StorePool, config: &TasksConfig) {
    let claimed = match store.tasks().claim(config.claim_batch_size, Utc::now()).await {
        Ok(tasks) => tasks,
        Err(e) => {
            tracing::error!(error = %e, "task claim failed");
            tokio::time::sleep(config.poll_interval()).await;
            return;
        }
    };

    if claimed.is_empty() {
        tokio::time::sleep(config.poll_interval()).await;
        return;
    }

    for task in &claimed {
        let outcome = handlers.dispatch(task).await;
        handlers.settle(task, outcome, config).await;
    }
}
