use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_valid::Valid;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::Identity,
    models::{AccessLevel, ConversationMembership, UpsertMembership},
    services::CoreError,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ConversationMembership>>, CoreError> {
    let memberships = state.services.memberships.list(&identity, id).await?;
    Ok(Json(memberships))
}

pub async fn grant(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Valid(Json(input)): Valid<Json<UpsertMembership>>,
) -> Result<(StatusCode, Json<ConversationMembership>), CoreError> {
    let membership = state
        .services
        .memberships
        .upsert(&identity, id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMembershipBody {
    pub access_level: AccessLevel,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, user_id)): Path<(Uuid, String)>,
    Json(input): Json<UpdateMembershipBody>,
) -> Result<Json<ConversationMembership>, CoreError> {
    let membership = state
        .services
        .memberships
        .upsert(
            &identity,
            id,
            UpsertMembership {
                user_id,
                access_level: input.access_level,
            },
        )
        .await?;
    Ok(Json(membership))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, user_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, CoreError> {
    state
        .services
        .memberships
        .revoke(&identity, id, &user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
