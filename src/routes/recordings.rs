use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{AppState, auth::Identity, models::AccessLevel, services::CoreError};

/// Cancel the active recording for a conversation. Idempotent: repeat
/// cancels and missing recordings still return success.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    let (_conversation, group) = state.services.entries.load_conversation(id, false).await?;
    state
        .services
        .access
        .require(&identity, &group, AccessLevel::Writer)
        .await?;

    state
        .recorder
        .cancel(id)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
