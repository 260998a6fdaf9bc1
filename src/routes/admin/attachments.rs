use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::{check_justification, conversations::JustificationQuery};
use crate::{AppState, auth::Identity, models::Attachment, services::CoreError};

pub async fn get_one(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Attachment>, CoreError> {
    let attachment = state.services.attachments.get(id).await?;
    Ok(Json(attachment))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Query(query): Query<JustificationQuery>,
) -> Result<StatusCode, CoreError> {
    check_justification(&state, query.justification.as_deref())?;
    tracing::info!(
        target: "audit",
        user_id = %identity.user_id,
        attachment_id = %id,
        "admin attachment delete"
    );
    state.services.attachments.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
