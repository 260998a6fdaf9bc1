//! Request middleware: bearer authentication and admin gating.
//!
//! Authentication resolves every request to an [`Identity`] before leaf
//! handlers run; handlers receive the resolved caller as an extension
//! and never touch credentials.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{auth::Authenticator, services::CoreError};

/// Shared authenticator handed to the middleware layer.
#[derive(Clone)]
pub struct AuthLayer {
    pub authenticator: Arc<Authenticator>,
}

/// Resolve `Authorization: Bearer` plus the client-id headers into an
/// [`crate::auth::Identity`] request extension. 401 on failure.
pub async fn authenticate(
    State(layer): State<AuthLayer>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let client_header = request
        .headers()
        .get("x-api-key")
        .or_else(|| request.headers().get("x-client-id"))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let Some(bearer) = bearer else {
        return CoreError::Unauthenticated.into_response();
    };

    match layer.authenticator.authenticate(bearer, client_header) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "authentication failed");
            CoreError::Unauthenticated.into_response()
        }
    }
}

/// Gate `/v1/admin/*`: reads require auditor (admin implies auditor),
/// writes require admin. Runs after [`authenticate`].
pub async fn admin_gate(request: Request, next: Next) -> Response {
    let Some(identity) = request.extensions().get::<crate::auth::Identity>() else {
        return CoreError::Unauthenticated.into_response();
    };

    let method = request.method();
    // Search is a POST but reads; auditors may run it.
    let read_only = method == axum::http::Method::GET
        || method == axum::http::Method::HEAD
        || (method == axum::http::Method::POST && request.uri().path().ends_with("/search"));
    let allowed = if read_only {
        identity.is_auditor()
    } else {
        identity.is_admin()
    };
    if !allowed {
        let required = if read_only { "auditor" } else { "admin" };
        return CoreError::AccessDenied(format!("requires {} role", required)).into_response();
    }
    next.run(request).await
}
