use serde::{Deserialize, Serialize};

/// Role resolution configuration.
///
/// Each role is granted by OR'ing three mechanisms: an OIDC role-name
/// mapping, an explicit user-id list, and an API-key client-id list.
/// `admin` implies `auditor`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    #[serde(default)]
    pub admin: RoleGrants,
    #[serde(default)]
    pub auditor: RoleGrants,
    #[serde(default)]
    pub indexer: RoleGrants,
}

/// Grant sources for one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleGrants {
    /// OIDC role name that maps to this role.
    pub oidc_role: Option<String>,

    /// User ids that hold this role.
    #[serde(default)]
    pub users: Vec<String>,

    /// API-key client ids that hold this role.
    #[serde(default)]
    pub clients: Vec<String>,
}
