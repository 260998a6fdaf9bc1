use axum::{
    Extension, Json,
    extract::{Query, State},
};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Page, conversations::ListQuery, decode_cursor};
use crate::{
    AppState,
    auth::Identity,
    models::{IndexRequest, SearchRequest, SearchResponse, validators},
    services::CoreError,
    store::ListParams,
};

pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(Json(request)): Valid<Json<SearchRequest>>,
) -> Result<Json<SearchResponse>, CoreError> {
    let scope = state
        .search
        .scope_for_user(&identity, request.conversation_ids.clone())
        .await?;
    let response = state.search.search(scope, &request).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchIndexResponse {
    pub accepted: u64,
}

pub async fn batch_index(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(Json(request)): Valid<Json<IndexRequest>>,
) -> Result<Json<BatchIndexResponse>, CoreError> {
    let accepted = state.search.batch_index(&identity, request).await?;
    Ok(Json(BatchIndexResponse { accepted }))
}

/// A HISTORY entry awaiting index submission. Content stays encrypted;
/// only addressing metadata is exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnindexedEntry {
    pub entry_id: Uuid,
    pub conversation_id: Uuid,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

pub async fn list_unindexed(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<UnindexedEntry>>, CoreError> {
    if !identity.is_indexer() && !identity.is_admin() {
        return Err(CoreError::AccessDenied("requires indexer role".to_string()));
    }
    let params = ListParams {
        limit: Some(validators::clamp_limit(
            query.limit,
            validators::MAX_AGENT_LIST_LIMIT,
        )),
        after: decode_cursor(query.after.as_deref())?,
        ..Default::default()
    };
    let result = state.store.entries().list_missing_indexed_content(&params).await?;
    Ok(Json(
        result
            .map(|row| UnindexedEntry {
                entry_id: row.id,
                conversation_id: row.conversation_id,
                content_type: row.content_type,
                created_at: row.created_at,
            })
            .into(),
    ))
}
