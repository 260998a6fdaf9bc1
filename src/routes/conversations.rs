use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_valid::Valid;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{Page, decode_cursor};
use crate::{
    AppState,
    auth::Identity,
    models::{
        AppendEntry, Channel, Conversation, ConversationWithTitle, CreateConversation, CreateFork,
        Entry, ForkMode, SyncMemory, SyncOutcome, UpdateConversationGroup, validators,
    },
    services::{CoreError, CoreResult, ListEntriesQuery},
    store::ListParams,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub after: Option<String>,
    pub limit: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(Json(input)): Valid<Json<CreateConversation>>,
) -> Result<(StatusCode, Json<ConversationWithTitle>), CoreError> {
    let conversation = state.services.conversations.create(&identity, input).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ConversationWithTitle>>, CoreError> {
    let params = ListParams {
        limit: Some(validators::clamp_limit(
            query.limit,
            validators::MAX_AGENT_LIST_LIMIT,
        )),
        after: decode_cursor(query.after.as_deref())?,
        ..Default::default()
    };
    let result = state.services.conversations.list(&identity, params).await?;
    Ok(Json(result.into()))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationWithTitle>, CoreError> {
    let conversation = state.services.conversations.get(&identity, id).await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PatchConversation {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    #[validate(custom(function = "crate::models::validators::validate_metadata"))]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<PatchConversation>>,
) -> Result<Json<ConversationWithTitle>, CoreError> {
    let conversation = state
        .services
        .conversations
        .update(
            &identity,
            id,
            UpdateConversationGroup {
                title: input.title,
                metadata: None,
            },
            input.metadata,
        )
        .await?;
    Ok(Json(conversation))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.services.conversations.soft_delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesParams {
    pub channel: Option<Channel>,
    pub forks: Option<ForkMode>,
    pub after: Option<String>,
    pub limit: Option<i64>,
}

fn entries_query(params: &ListEntriesParams, ceiling: i64) -> CoreResult<ListEntriesQuery> {
    Ok(ListEntriesQuery {
        channel: params.channel,
        forks: params.forks.unwrap_or_default(),
        after: decode_cursor(params.after.as_deref())?,
        limit: Some(validators::clamp_limit(params.limit, ceiling)),
    })
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Query(params): Query<ListEntriesParams>,
) -> Result<Json<Page<Entry>>, CoreError> {
    let query = entries_query(&params, validators::MAX_AGENT_LIST_LIMIT)?;
    let result = state
        .services
        .entries
        .list(&identity, id, &query, false)
        .await?;
    Ok(Json(result.into()))
}

pub async fn append_entry(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<AppendEntry>>,
) -> Result<(StatusCode, Json<Entry>), CoreError> {
    let entry = state.services.entries.append(&identity, id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn sync_memory(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<SyncMemory>>,
) -> Result<Json<SyncOutcome>, CoreError> {
    let outcome = state
        .services
        .entries
        .sync_memory(&identity, id, input)
        .await?;
    Ok(Json(outcome))
}

pub async fn create_fork(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateFork>,
) -> Result<(StatusCode, Json<Conversation>), CoreError> {
    let fork = state
        .services
        .conversations
        .create_fork(&identity, id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(fork)))
}

pub async fn list_forks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Conversation>>, CoreError> {
    let forks = state.services.conversations.list_forks(&identity, id).await?;
    Ok(Json(forks))
}
