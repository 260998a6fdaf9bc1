use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::services::CoreError;

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable code.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            CoreError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("validation_error", msg),
            ),
            CoreError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new("unauthenticated", "Missing or invalid credentials"),
            ),
            CoreError::AccessDenied(msg) => {
                (StatusCode::FORBIDDEN, ErrorBody::new("access_denied", msg))
            }
            CoreError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorBody::new("resource_not_found", msg))
            }
            CoreError::Conflict { message, details } => {
                let mut body = ErrorBody::new("resource_conflict", message);
                body.details = details;
                (StatusCode::CONFLICT, body)
            }
            CoreError::Precondition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody::new("precondition_failed", msg),
            ),
            CoreError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody::new("payload_too_large", msg),
            ),
            CoreError::SearchTypeUnavailable { available } => (
                StatusCode::NOT_IMPLEMENTED,
                ErrorBody::new(
                    "search_type_unavailable",
                    "The requested search type is not available",
                )
                .with_details(serde_json::json!({
                    "availableTypes": available
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>(),
                })),
            ),
            CoreError::JustificationRequired => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(
                    "justification_required",
                    "This operation requires a justification",
                ),
            ),
            CoreError::Storage(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("storage_error", "An internal error occurred"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;
    use crate::models::SearchType;

    #[test]
    fn conflict_carries_details() {
        let response = CoreError::Conflict {
            message: "duplicate".to_string(),
            details: Some(serde_json::json!({ "existingTransferId": "x" })),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn search_unavailable_is_501() {
        let response = CoreError::SearchTypeUnavailable {
            available: vec![SearchType::Fulltext],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (
                CoreError::Validation("x".into()).into_response().status(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Unauthenticated.into_response().status(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                CoreError::AccessDenied("x".into()).into_response().status(),
                StatusCode::FORBIDDEN,
            ),
            (
                CoreError::NotFound("x".into()).into_response().status(),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::Precondition("x".into()).into_response().status(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoreError::PayloadTooLarge("x".into()).into_response().status(),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                CoreError::JustificationRequired.into_response().status(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Storage("x".into()).into_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (got, want) in cases {
            assert_eq!(got, want);
        }
    }
}
