use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_valid::Valid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    auth::Identity,
    eviction::parse_iso8601_duration,
    models::{Attachment, CreateAttachment},
    services::CoreError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachmentQuery {
    /// ISO-8601 duration bounding the unlinked TTL, e.g. `PT1H`.
    pub expires_in: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<CreateAttachmentQuery>,
    Valid(Json(input)): Valid<Json<CreateAttachment>>,
) -> Result<(StatusCode, Json<Attachment>), CoreError> {
    let expires_in_secs = query
        .expires_in
        .as_deref()
        .map(|raw| {
            parse_iso8601_duration(raw)
                .map_err(CoreError::Validation)
                .map(|d| d.num_seconds().max(0) as u64)
        })
        .transpose()?;

    let attachment = state
        .services
        .attachments
        .create(&identity, input, expires_in_secs)
        .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Attachment>, CoreError> {
    let attachment = state.services.attachments.get(id).await?;
    Ok(Json(attachment))
}

/// Upload the payload bytes of a pre-created attachment.
pub async fn upload_content(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Attachment>, CoreError> {
    state.services.attachments.store_payload(id, body).await?;
    let attachment = state.services.attachments.get(id).await?;
    Ok(Json(attachment))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub url: String,
    pub expires_in_secs: u64,
}

pub async fn download_url(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadUrlResponse>, CoreError> {
    // Resolve first so a missing attachment is 404, not a signed dead link.
    let attachment = state.services.attachments.get(id).await?;
    let token = state.services.attachments.sign_download_token(id)?;
    Ok(Json(DownloadUrlResponse {
        url: format!(
            "/v1/attachments/{}/download/{}/{}",
            attachment.id, token, "attachment"
        ),
        expires_in_secs: state.config.attachments.download_token_ttl_secs,
    }))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path((id, token, _filename)): Path<(Uuid, String, String)>,
) -> Result<Response, CoreError> {
    state.services.attachments.verify_download_token(id, &token)?;
    let (attachment, data) = state.services.attachments.payload(id).await?;

    let content_type = attachment
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        data,
    )
        .into_response())
}
