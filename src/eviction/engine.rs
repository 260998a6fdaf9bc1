use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::parse_iso8601_duration;
use crate::{
    config::EvictionConfig,
    services::{CoreError, CoreResult},
    store::StorePool,
};

/// Resource types the eviction engine can hard-delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    ConversationGroups,
    ConversationMemberships,
}

/// Admin eviction request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictRequest {
    /// ISO-8601 duration, e.g. `P90D`.
    pub retention_period: String,
    pub resource_types: Vec<ResourceType>,
    /// Audit justification; mandatory when the server requires it.
    #[serde(default)]
    pub justification: Option<String>,
}

/// Results from one eviction run.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionRunResult {
    pub groups_deleted: u64,
    pub memberships_deleted: u64,
}

/// State of an async eviction job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "status")]
pub enum EvictJobState {
    Pending,
    Running { progress: u8 },
    Completed { result: EvictionRunResult },
    Failed { error: String },
}

/// Batched hard-delete with progress reporting and an async-job registry.
pub struct EvictionEngine {
    store: Arc<StorePool>,
    config: EvictionConfig,
    jobs: DashMap<Uuid, EvictJobState>,
}

impl EvictionEngine {
    pub fn new(store: Arc<StorePool>, config: EvictionConfig) -> Self {
        Self {
            store,
            config,
            jobs: DashMap::new(),
        }
    }

    /// Run an eviction synchronously, streaming progress percentages
    /// (monotonic, capped at 99 until the final 100) into `progress`.
    pub async fn run(
        &self,
        request: &EvictRequest,
        progress: Option<mpsc::Sender<u8>>,
    ) -> CoreResult<EvictionRunResult> {
        let retention = parse_iso8601_duration(&request.retention_period)
            .map_err(CoreError::Validation)?;
        if request.resource_types.is_empty() {
            return Err(CoreError::Validation(
                "resourceTypes cannot be empty".to_string(),
            ));
        }

        let cutoff = Utc::now() - retention;
        let batch_size = self.config.batch_size;

        // Estimate total work for progress reporting. Approximate under
        // concurrent eviction.
        let mut batches_total = 0u64;
        for resource in &request.resource_types {
            let count = match resource {
                ResourceType::ConversationGroups => {
                    self.store.groups().count_evictable(cutoff).await?
                }
                ResourceType::ConversationMemberships => {
                    self.store.memberships().count_evictable(cutoff).await?
                }
            };
            batches_total += (count as u64).div_ceil(batch_size as u64);
        }

        let mut result = EvictionRunResult::default();
        let mut batches_done = 0u64;
        let mut last_emitted = 0u8;

        for resource in &request.resource_types {
            loop {
                let deleted = match resource {
                    ResourceType::ConversationGroups => {
                        // The store enqueues one vector_store_delete task
                        // per group before removing the rows.
                        let ids = self.store.groups().evict_batch(cutoff, batch_size).await?;
                        result.groups_deleted += ids.len() as u64;
                        ids.len() as u64
                    }
                    ResourceType::ConversationMemberships => {
                        let n = self
                            .store
                            .memberships()
                            .evict_batch(cutoff, batch_size)
                            .await?;
                        result.memberships_deleted += n;
                        n
                    }
                };
                if deleted == 0 {
                    break;
                }

                batches_done += 1;
                if let Some(tx) = &progress {
                    let percent = if batches_total == 0 {
                        99
                    } else {
                        ((batches_done * 100) / batches_total).min(99) as u8
                    };
                    if percent > last_emitted {
                        last_emitted = percent;
                        // A gone receiver only means the client hung up.
                        let _ = tx.send(percent).await;
                    }
                }

                if deleted < batch_size as u64 {
                    break;
                }
                tokio::time::sleep(self.config.batch_delay()).await;
            }
        }

        if let Some(tx) = &progress {
            let _ = tx.send(100).await;
        }
        tracing::info!(
            groups = result.groups_deleted,
            memberships = result.memberships_deleted,
            retention = %request.retention_period,
            "eviction run complete"
        );
        Ok(result)
    }

    /// Start an async eviction job; returns the job id immediately.
    pub fn start_job(self: &Arc<Self>, request: EvictRequest) -> Uuid {
        let job_id = Uuid::new_v4();
        self.jobs.insert(job_id, EvictJobState::Pending);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine
                .jobs
                .insert(job_id, EvictJobState::Running { progress: 0 });

            let (tx, mut rx) = mpsc::channel(16);
            let runner = {
                let engine = Arc::clone(&engine);
                let request = request.clone();
                tokio::spawn(async move { engine.run(&request, Some(tx)).await })
            };

            while let Some(percent) = rx.recv().await {
                engine.jobs.insert(
                    job_id,
                    EvictJobState::Running {
                        progress: percent.min(99),
                    },
                );
            }

            let state = match runner.await {
                Ok(Ok(result)) => EvictJobState::Completed { result },
                Ok(Err(e)) => EvictJobState::Failed {
                    error: e.to_string(),
                },
                Err(e) => EvictJobState::Failed {
                    error: format!("eviction job panicked: {}", e),
                },
            };
            engine.jobs.insert(job_id, state);
        });

        job_id
    }

    pub fn job_state(&self, job_id: Uuid) -> Option<EvictJobState> {
        self.jobs.get(&job_id).map(|s| s.clone())
    }
}
