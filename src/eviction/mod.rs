//! Batched hard-delete of soft-deleted records past a retention window.
//!
//! Eviction never collides with user traffic: user reads filter
//! `deleted_at IS NULL` while eviction claims `deleted_at IS NOT NULL`,
//! disjoint row sets. Batches are claimed with skip-locked semantics so
//! concurrent eviction calls stay disjoint.

mod duration;
mod engine;

pub use duration::parse_iso8601_duration;
pub use engine::{
    EvictJobState, EvictRequest, EvictionEngine, EvictionRunResult, ResourceType,
};
