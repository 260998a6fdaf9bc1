//! Engram: a multi-tenant conversation-memory service for LLM agent
//! applications.
//!
//! The crate is organized around eight cooperating subsystems:
//!
//! - [`store`] — the primary store: conversation groups, conversations,
//!   entries, memberships, ownership transfers, attachments metadata and
//!   the background-task table, behind per-entity repository traits with
//!   PostgreSQL and SQLite implementations.
//! - [`crypto`] — the at-rest encryption envelope (AES-256-GCM with a
//!   versioned `MSEH` header) applied to conversation titles and entry
//!   content.
//! - [`auth`] / [`middleware`] — identity and role resolution for the
//!   Agent and Admin APIs.
//! - [`search`] — the per-entry indexing lifecycle, embedding service and
//!   vector backends with hybrid semantic / full-text routing.
//! - [`tasks`] — the at-least-once background task queue with idempotent
//!   singleton tasks.
//! - [`recorder`] — live response recording and replay.
//! - [`eviction`] — batched hard-delete of soft-deleted records.
//! - [`services`] / [`routes`] — the coordination layer and HTTP surface.

pub mod auth;
pub mod blob;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod eviction;
pub mod middleware;
pub mod models;
pub mod recorder;
pub mod routes;
pub mod search;
pub mod services;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio_util::task::TaskTracker;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::ServiceConfig>,
    pub store: Arc<store::StorePool>,
    pub services: services::Services,
    pub search: Arc<search::SearchCoordinator>,
    pub recorder: Arc<dyn recorder::ResponseRecorder>,
    pub eviction: Arc<eviction::EvictionEngine>,
    pub blobs: Arc<dyn blob::BlobStore>,
    /// Tracks background tasks so graceful shutdown can wait for them.
    pub task_tracker: TaskTracker,
}
