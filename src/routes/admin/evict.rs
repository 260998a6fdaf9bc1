use std::convert::Infallible;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::check_justification;
use crate::{
    AppState,
    auth::Identity,
    eviction::{EvictJobState, EvictRequest},
    services::CoreError,
};

#[derive(Debug, Deserialize)]
pub struct EvictQuery {
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictJobAccepted {
    pub job_id: Uuid,
}

/// Batched hard-delete with retention. Three response modes:
/// synchronous 204 (default), SSE progress events when the client
/// accepts `text/event-stream`, or a job id with `?async=true`.
pub async fn evict(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EvictQuery>,
    headers: axum::http::HeaderMap,
    Json(request): Json<EvictRequest>,
) -> Result<Response, CoreError> {
    check_justification(&state, request.justification.as_deref())?;
    tracing::info!(
        target: "audit",
        user_id = %identity.user_id,
        retention = %request.retention_period,
        resource_types = ?request.resource_types,
        justification = request.justification.as_deref().unwrap_or(""),
        "admin eviction requested"
    );

    if query.run_async {
        let job_id = state.eviction.start_job(request);
        return Ok((StatusCode::ACCEPTED, Json(EvictJobAccepted { job_id })).into_response());
    }

    let wants_sse = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));

    if wants_sse {
        let (tx, rx) = mpsc::channel::<u8>(16);
        let engine = state.eviction.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run(&request, Some(tx)).await {
                tracing::error!(error = %e, "eviction run failed");
            }
        });

        let stream = tokio_stream_from(rx).map(|progress| {
            Ok::<Event, Infallible>(
                Event::default().data(serde_json::json!({ "progress": progress }).to_string()),
            )
        });
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    state.eviction.run(&request, None).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn tokio_stream_from(
    mut rx: mpsc::Receiver<u8>,
) -> impl futures_util::Stream<Item = u8> + Send {
    futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx))
}

pub async fn job_status(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<EvictJobState>, CoreError> {
    state
        .eviction
        .job_state(job_id)
        .map(Json)
        .ok_or_else(|| CoreError::not_found("eviction job"))
}
