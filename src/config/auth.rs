use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Authentication configuration.
///
/// Two credential shapes are accepted on `Authorization: Bearer`:
/// JWTs (verified with `jwt_secret`, user id from the subject claim) and
/// opaque API keys resolved through the `api_keys` map. The client id is
/// taken from the `X-API-Key` / `X-Client-ID` headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 secret for JWT verification. When absent, JWT bearer tokens
    /// are rejected and only the API-key map authenticates callers.
    pub jwt_secret: Option<String>,

    /// OIDC claim carrying role names, mapped through
    /// `[roles.*.oidc_role]`.
    #[serde(default = "default_roles_claim")]
    pub roles_claim: String,

    /// Opaque bearer token → identity mapping.
    #[serde(default)]
    pub api_keys: HashMap<String, ApiKeyIdentity>,
}

/// The identity an opaque API key resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyIdentity {
    pub user: String,
    /// Client id implied by the key, used for MEMORY scoping and
    /// client-role mapping when no explicit header is present.
    pub client: Option<String>,
}

fn default_roles_claim() -> String {
    "roles".to_string()
}
