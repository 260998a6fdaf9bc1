use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Background task queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    /// Number of worker loops per process.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Tasks claimed per poll.
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: u32,

    /// Idle poll interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Default delay before a failed task retries.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Tasks stuck in PROCESSING longer than this are reset to PENDING.
    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,

    /// Handler-level attempt cap before a retrying task is marked dead.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            claim_batch_size: default_claim_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            stuck_after_secs: default_stuck_after_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl TasksConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Validation(
                "tasks.worker_count must be positive".into(),
            ));
        }
        if self.claim_batch_size == 0 {
            return Err(ConfigError::Validation(
                "tasks.claim_batch_size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }
}

fn default_worker_count() -> usize {
    2
}

fn default_claim_batch_size() -> u32 {
    10
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_retry_delay_secs() -> u64 {
    600
}

fn default_stuck_after_secs() -> u64 {
    900
}

fn default_max_attempts() -> i32 {
    10
}
