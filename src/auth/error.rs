use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid bearer token")]
    InvalidToken,

    #[error("JWT authentication is not configured")]
    JwtNotConfigured,
}
