use serde::{Deserialize, Serialize};

/// Internal roles a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Auditor,
    Indexer,
}

/// The set of roles resolved for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSet {
    pub admin: bool,
    pub auditor: bool,
    pub indexer: bool,
}

impl RoleSet {
    pub fn has(&self, role: Role) -> bool {
        match role {
            Role::Admin => self.admin,
            // admin implies auditor
            Role::Auditor => self.auditor || self.admin,
            Role::Indexer => self.indexer,
        }
    }

    pub fn grant(&mut self, role: Role) {
        match role {
            Role::Admin => self.admin = true,
            Role::Auditor => self.auditor = true,
            Role::Indexer => self.indexer = true,
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Identity {
    /// User id from the OIDC subject claim or the API-key mapping.
    pub user_id: String,

    /// Client id, when the caller is an agent. Scopes MEMORY entries and
    /// feeds client-role mapping.
    pub client_id: Option<String>,

    pub roles: RoleSet,
}

impl Identity {
    /// Whether the caller is an agent (carries a client id).
    pub fn is_agent(&self) -> bool {
        self.client_id.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.roles.has(Role::Admin)
    }

    pub fn is_auditor(&self) -> bool {
        self.roles.has(Role::Auditor)
    }

    pub fn is_indexer(&self) -> bool {
        self.roles.has(Role::Indexer)
    }

    /// A plain user identity for tests.
    #[cfg(test)]
    pub fn test_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            client_id: None,
            roles: RoleSet::default(),
        }
    }

    /// An agent identity for tests.
    #[cfg(test)]
    pub fn test_agent(user_id: &str, client_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            client_id: Some(client_id.to_string()),
            roles: RoleSet::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_implies_auditor() {
        let roles = RoleSet {
            admin: true,
            ..Default::default()
        };
        assert!(roles.has(Role::Auditor));
        assert!(!roles.has(Role::Indexer));
    }
}
