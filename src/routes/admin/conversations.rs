use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::check_justification;
use crate::{
    AppState,
    auth::Identity,
    models::{
        AdminGroupFilter, Channel, ConversationWithTitle, Entry, ForkMode, SearchRequest,
        SearchResponse, validators,
    },
    routes::{Page, decode_cursor},
    search::SearchScope,
    services::{CoreError, ListEntriesQuery},
    store::ListParams,
};

/// Admin view of a conversation group.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGroupView {
    pub id: Uuid,
    pub owner_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListQuery {
    pub user_id: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub only_deleted: bool,
    pub deleted_after: Option<DateTime<Utc>>,
    pub deleted_before: Option<DateTime<Utc>>,
    pub after: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Page<AdminGroupView>>, CoreError> {
    let filter = AdminGroupFilter {
        user_id: query.user_id.clone(),
        include_deleted: query.include_deleted,
        only_deleted: query.only_deleted,
        deleted_after: query.deleted_after,
        deleted_before: query.deleted_before,
    };
    let params = ListParams {
        limit: Some(validators::clamp_limit(
            query.limit,
            validators::MAX_ADMIN_LIST_LIMIT,
        )),
        after: decode_cursor(query.after.as_deref())?,
    };
    let result = state
        .services
        .conversations
        .admin_list(&identity, &filter, &params)
        .await?;
    Ok(Json(
        result
            .map(|(group, title)| AdminGroupView {
                id: group.id,
                owner_user_id: group.owner_user_id,
                title,
                created_at: group.created_at,
                updated_at: group.updated_at,
                deleted_at: group.deleted_at,
            })
            .into(),
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationWithTitle>, CoreError> {
    let (conversation, _group) = state
        .services
        .conversations
        .admin_get(&identity, id)
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
pub struct JustificationQuery {
    pub justification: Option<String>,
}

pub async fn soft_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Query(query): Query<JustificationQuery>,
) -> Result<StatusCode, CoreError> {
    check_justification(&state, query.justification.as_deref())?;
    state
        .services
        .conversations
        .admin_soft_delete(&identity, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Query(query): Query<JustificationQuery>,
) -> Result<StatusCode, CoreError> {
    check_justification(&state, query.justification.as_deref())?;
    state.services.conversations.restore(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEntriesQuery {
    pub channel: Option<Channel>,
    pub forks: Option<ForkMode>,
    pub after: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Query(params): Query<AdminEntriesQuery>,
) -> Result<Json<Page<Entry>>, CoreError> {
    let query = ListEntriesQuery {
        channel: params.channel,
        forks: params.forks.unwrap_or_default(),
        after: decode_cursor(params.after.as_deref())?,
        limit: Some(validators::clamp_limit(
            params.limit,
            validators::MAX_ADMIN_LIST_LIMIT,
        )),
    };
    // Admin listing sees soft-deleted conversations.
    let result = state
        .services
        .entries
        .list(&identity, id, &query, true)
        .await?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminSearchRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub request: SearchRequest,
    /// Scope the search to one user's accessible groups. Without it the
    /// search spans all groups (bounded by the admin listing cap).
    pub user_id: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(Json(body)): Valid<Json<AdminSearchRequest>>,
) -> Result<Json<SearchResponse>, CoreError> {
    if !identity.is_auditor() {
        return Err(CoreError::AccessDenied("requires auditor role".to_string()));
    }

    let group_ids = match &body.user_id {
        Some(user_id) => state.store.memberships().accessible_group_ids(user_id).await?,
        None => {
            let all = state
                .store
                .groups()
                .list_admin(
                    &AdminGroupFilter::default(),
                    &ListParams {
                        limit: Some(validators::MAX_ADMIN_LIST_LIMIT),
                        ..Default::default()
                    },
                )
                .await?;
            all.items.into_iter().map(|g| g.id).collect()
        }
    };

    let scope = SearchScope {
        group_ids,
        conversation_ids: body.request.conversation_ids.clone(),
    };
    let response = state.search.search(scope, &body.request).await?;
    Ok(Json(response))
}
