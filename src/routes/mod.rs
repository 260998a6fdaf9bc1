pub mod admin;
mod attachments;
mod conversations;
mod error;
mod health;
mod memberships;
mod recordings;
mod search;
mod transfers;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
pub use error::ErrorBody;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{AuthLayer, admin_gate, authenticate},
    services::{CoreError, CoreResult},
    store::{Cursor, ListResult},
};

/// Wire shape of a cursor-paginated listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> From<ListResult<T>> for Page<T> {
    fn from(result: ListResult<T>) -> Self {
        Self {
            data: result.items,
            has_more: result.has_more,
            next_cursor: result.next.map(|c| c.encode()),
        }
    }
}

/// Decode an opaque cursor query parameter.
pub(crate) fn decode_cursor(after: Option<&str>) -> CoreResult<Option<Cursor>> {
    after
        .map(|raw| {
            Cursor::decode(raw).map_err(|_| CoreError::Validation("invalid cursor".to_string()))
        })
        .transpose()
}

/// Assemble the full application router.
pub fn router(state: AppState, auth: AuthLayer) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let attachment_limit = state.config.attachments.max_size_bytes as usize;

    let agent = Router::new()
        .route(
            "/conversations",
            post(conversations::create).get(conversations::list),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_one)
                .patch(conversations::update)
                .delete(conversations::soft_delete),
        )
        .route(
            "/conversations/{id}/entries",
            get(conversations::list_entries).post(conversations::append_entry),
        )
        .route(
            "/conversations/{id}/entries/sync",
            post(conversations::sync_memory),
        )
        .route(
            "/conversations/{id}/forks",
            post(conversations::create_fork).get(conversations::list_forks),
        )
        .route(
            "/conversations/{id}/memberships",
            get(memberships::list).post(memberships::grant),
        )
        .route(
            "/conversations/{id}/memberships/{user_id}",
            axum::routing::patch(memberships::update).delete(memberships::revoke),
        )
        .route(
            "/conversations/{id}/response",
            delete(recordings::cancel),
        )
        .route(
            "/ownership-transfers",
            get(transfers::list).post(transfers::create),
        )
        .route(
            "/ownership-transfers/{id}",
            get(transfers::get_one).delete(transfers::cancel),
        )
        .route("/ownership-transfers/{id}/accept", post(transfers::accept))
        .route("/conversations/search", post(search::search))
        .route("/conversations/index", post(search::batch_index))
        .route("/conversations/unindexed", get(search::list_unindexed))
        .route("/attachments", post(attachments::create))
        .route(
            "/attachments/{id}",
            get(attachments::get_one),
        )
        .route(
            "/attachments/{id}/content",
            axum::routing::put(attachments::upload_content)
                .layer(DefaultBodyLimit::max(attachment_limit)),
        )
        .route("/attachments/{id}/download-url", get(attachments::download_url))
        .route(
            "/attachments/{id}/download/{token}/{filename}",
            get(attachments::download),
        )
        .layer(from_fn_with_state(auth.clone(), authenticate));

    let admin_routes = Router::new()
        .route("/conversations", get(admin::conversations::list))
        .route(
            "/conversations/{id}",
            get(admin::conversations::get_one).delete(admin::conversations::soft_delete),
        )
        .route(
            "/conversations/{id}/restore",
            post(admin::conversations::restore),
        )
        .route(
            "/conversations/{id}/entries",
            get(admin::conversations::list_entries),
        )
        .route("/conversations/search", post(admin::conversations::search))
        .route("/evict", post(admin::evict::evict))
        .route("/evict/jobs/{job_id}", get(admin::evict::job_status))
        .route(
            "/attachments/{id}",
            get(admin::attachments::get_one).delete(admin::attachments::delete),
        )
        .layer(from_fn(admin_gate))
        .layer(from_fn_with_state(auth, authenticate));

    Router::new()
        .route("/healthz", get(health::health))
        .nest("/v1/admin", admin_routes)
        .nest("/v1", agent)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
