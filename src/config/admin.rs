use serde::{Deserialize, Serialize};

/// Admin API behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    /// When set, every mutating admin call must carry a `justification`
    /// field; calls without one are rejected.
    #[serde(default)]
    pub require_justification: bool,
}
