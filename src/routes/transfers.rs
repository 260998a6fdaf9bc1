use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    AppState,
    auth::Identity,
    models::{CreateTransfer, OwnershipTransfer},
    services::CoreError,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<OwnershipTransfer>>, CoreError> {
    let transfers = state.services.transfers.list(&identity).await?;
    Ok(Json(transfers))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(Json(input)): Valid<Json<CreateTransfer>>,
) -> Result<(StatusCode, Json<OwnershipTransfer>), CoreError> {
    let transfer = state.services.transfers.create(&identity, input).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<OwnershipTransfer>, CoreError> {
    let transfer = state.services.transfers.get(&identity, id).await?;
    Ok(Json(transfer))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<OwnershipTransfer>, CoreError> {
    let transfer = state.services.transfers.accept(&identity, id).await?;
    Ok(Json(transfer))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CoreError> {
    state.services.transfers.cancel(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
