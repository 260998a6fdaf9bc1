use thiserror::Error;

use crate::{crypto::CryptoError, models::SearchType, store::StoreError};

/// Core error taxonomy. Every subsystem error funnels into one of these
/// kinds; the HTTP layer maps them to status codes at the edge.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Field-level constraint violation. 400.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials. 401.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Known caller, denied action. 403.
    #[error("{0}")]
    AccessDenied(String),

    /// Absent, soft-deleted (to non-admin), or invisible. 404.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate pending transfer, restore-already-active, cursor race. 409.
    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Semantically invalid against current state. 422.
    #[error("{0}")]
    Precondition(String),

    /// Body or attachment over limit. 413.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Requested search type is not configured. 501.
    #[error("search type unavailable")]
    SearchTypeUnavailable { available: Vec<SearchType> },

    /// Admin mutation without justification while required. 400.
    #[error("justification required")]
    JustificationRequired,

    /// Upstream backend failure. 500.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(what: &str) -> Self {
        CoreError::NotFound(format!("{} not found", what))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict {
            message: message.into(),
            details: None,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CoreError::NotFound("resource not found".to_string()),
            StoreError::Conflict(msg) => CoreError::conflict(msg),
            StoreError::UniqueViolation(msg) => CoreError::conflict(msg),
            StoreError::Validation(msg) => CoreError::Validation(msg),
            other => {
                tracing::error!(error = %other, "store error");
                CoreError::Storage("storage backend failure".to_string())
            }
        }
    }
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        tracing::error!(error = %err, "crypto error");
        CoreError::Storage("encryption failure".to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!(error = %err, "serialization error");
        CoreError::Storage("serialization failure".to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
