use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use super::{
    error::AuthError,
    identity::{Identity, Role, RoleSet},
};
use crate::config::{AuthConfig, RoleGrants, RolesConfig};

/// Resolves role membership from configuration.
#[derive(Clone)]
pub struct RoleResolver {
    config: RolesConfig,
}

impl RoleResolver {
    pub fn new(config: RolesConfig) -> Self {
        Self { config }
    }

    /// OR-union of the three grant mechanisms for every role.
    pub fn resolve(
        &self,
        user_id: &str,
        client_id: Option<&str>,
        oidc_roles: &[String],
    ) -> RoleSet {
        let mut roles = RoleSet::default();
        for (role, grants) in [
            (Role::Admin, &self.config.admin),
            (Role::Auditor, &self.config.auditor),
            (Role::Indexer, &self.config.indexer),
        ] {
            if Self::granted(grants, user_id, client_id, oidc_roles) {
                roles.grant(role);
            }
        }
        roles
    }

    fn granted(
        grants: &RoleGrants,
        user_id: &str,
        client_id: Option<&str>,
        oidc_roles: &[String],
    ) -> bool {
        if let Some(mapped) = &grants.oidc_role
            && oidc_roles.iter().any(|r| r == mapped)
        {
            return true;
        }
        if grants.users.iter().any(|u| u == user_id) {
            return true;
        }
        if let Some(client) = client_id
            && grants.clients.iter().any(|c| c == client)
        {
            return true;
        }
        false
    }
}

/// Authenticates bearer credentials into an [`Identity`].
#[derive(Clone)]
pub struct Authenticator {
    auth: AuthConfig,
    roles: RoleResolver,
}

impl Authenticator {
    pub fn new(auth: AuthConfig, roles: RolesConfig) -> Self {
        Self {
            auth,
            roles: RoleResolver::new(roles),
        }
    }

    /// Resolve a bearer token plus optional client-id header.
    ///
    /// JWTs (three dot-separated segments) verify against the configured
    /// HS256 secret; anything else resolves through the API-key map.
    pub fn authenticate(
        &self,
        bearer: &str,
        client_header: Option<&str>,
    ) -> Result<Identity, AuthError> {
        if bearer.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let (user_id, key_client, oidc_roles) = if looks_like_jwt(bearer) {
            let (sub, roles) = self.verify_jwt(bearer)?;
            (sub, None, roles)
        } else {
            let mapping = self
                .auth
                .api_keys
                .get(bearer)
                .ok_or(AuthError::InvalidToken)?;
            (mapping.user.clone(), mapping.client.clone(), Vec::new())
        };

        // An explicit client header wins over the key's implied client.
        let client_id = client_header
            .map(str::to_string)
            .or(key_client)
            .filter(|c| !c.is_empty());

        let roles = self
            .roles
            .resolve(&user_id, client_id.as_deref(), &oidc_roles);

        Ok(Identity {
            user_id,
            client_id,
            roles,
        })
    }

    fn verify_jwt(&self, token: &str) -> Result<(String, Vec<String>), AuthError> {
        let secret = self
            .auth
            .jwt_secret
            .as_deref()
            .ok_or(AuthError::JwtNotConfigured)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<serde_json::Value>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT verification failed");
            AuthError::InvalidToken
        })?;

        let sub = data
            .claims
            .get("sub")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::InvalidToken)?
            .to_string();

        let oidc_roles = data
            .claims
            .get(&self.auth.roles_claim)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok((sub, oidc_roles))
    }
}

fn looks_like_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;
    use crate::config::ApiKeyIdentity;

    fn roles_config() -> RolesConfig {
        RolesConfig {
            admin: RoleGrants {
                oidc_role: Some("svc-admin".to_string()),
                users: vec!["root".to_string()],
                clients: vec![],
            },
            auditor: RoleGrants {
                oidc_role: None,
                users: vec!["auditor-user".to_string()],
                clients: vec![],
            },
            indexer: RoleGrants {
                oidc_role: None,
                users: vec![],
                clients: vec!["indexer-bot".to_string()],
            },
        }
    }

    fn authenticator() -> Authenticator {
        let mut api_keys = HashMap::new();
        api_keys.insert(
            "agent-key-1".to_string(),
            ApiKeyIdentity {
                user: "alice".to_string(),
                client: Some("agent-1".to_string()),
            },
        );
        api_keys.insert(
            "indexer-key".to_string(),
            ApiKeyIdentity {
                user: "indexer-svc".to_string(),
                client: Some("indexer-bot".to_string()),
            },
        );
        Authenticator::new(
            AuthConfig {
                jwt_secret: Some("test-secret".to_string()),
                roles_claim: "roles".to_string(),
                api_keys,
            },
            roles_config(),
        )
    }

    fn make_jwt(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn api_key_resolves_user_and_client() {
        let identity = authenticator().authenticate("agent-key-1", None).unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.client_id.as_deref(), Some("agent-1"));
        assert!(!identity.is_admin());
    }

    #[test]
    fn client_header_overrides_key_client() {
        let identity = authenticator()
            .authenticate("agent-key-1", Some("agent-2"))
            .unwrap();
        assert_eq!(identity.client_id.as_deref(), Some("agent-2"));
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(matches!(
            authenticator().authenticate("nope", None),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn jwt_subject_becomes_user_id() {
        let token = make_jwt(serde_json::json!({ "sub": "bob", "exp": far_future() }));
        let identity = authenticator().authenticate(&token, None).unwrap();
        assert_eq!(identity.user_id, "bob");
        assert!(identity.client_id.is_none());
    }

    #[test]
    fn oidc_role_mapping_grants_admin() {
        let token = make_jwt(serde_json::json!({
            "sub": "carol",
            "exp": far_future(),
            "roles": ["svc-admin"],
        }));
        let identity = authenticator().authenticate(&token, None).unwrap();
        assert!(identity.is_admin());
        // admin implies auditor
        assert!(identity.is_auditor());
    }

    #[test]
    fn user_list_grants_admin() {
        let token = make_jwt(serde_json::json!({ "sub": "root", "exp": far_future() }));
        let identity = authenticator().authenticate(&token, None).unwrap();
        assert!(identity.is_admin());
    }

    #[test]
    fn client_list_grants_indexer() {
        let identity = authenticator().authenticate("indexer-key", None).unwrap();
        assert!(identity.is_indexer());
        assert!(!identity.is_admin());
    }

    #[test]
    fn tampered_jwt_rejected() {
        let token = make_jwt(serde_json::json!({ "sub": "bob", "exp": far_future() }));
        let tampered = format!("{}x", token);
        assert!(authenticator().authenticate(&tampered, None).is_err());
    }
}
