//! Background task queue workers.
//!
//! The queue itself lives in the primary store (see
//! `store::repos::tasks`); this module runs the worker loops that claim
//! due tasks, dispatch them to handlers, and re-arm failures. Claims are
//! atomic across replicas, so any number of processes can run workers.
//!
//! Handlers in scope:
//! - `vector_store_delete` — remove all vector rows for a conversation
//!   group; enqueued before eviction hard-deletes the group.
//! - `vector_store_index_retry` — singleton; re-indexes entries whose
//!   write-path indexing failed, re-arming itself while work remains.

mod worker;

pub use worker::{TaskHandlers, start_task_workers};
