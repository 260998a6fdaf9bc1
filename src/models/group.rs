use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;
use validator::Validate;

/// The access-control unit: a fork tree rooted at one conversation,
/// sharing one membership set.
///
/// The title is stored encrypted at rest; the model carries the decrypted
/// value. A `None` title means neither an explicit title nor a derived one
/// has been materialized yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationGroup {
    pub id: Uuid,
    pub owner_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ConversationGroup {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Request to update group-level fields through a conversation PATCH.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateConversationGroup {
    /// Explicit title override. Replaces any derived title.
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    /// Replacement metadata object.
    #[validate(custom(function = "crate::models::validators::validate_metadata"))]
    pub metadata: Option<Map<String, serde_json::Value>>,
}

/// Admin listing filters for cross-user group queries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGroupFilter {
    pub user_id: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default)]
    pub only_deleted: bool,
    /// Inclusive lower bound on `deleted_at`.
    pub deleted_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `deleted_at`.
    pub deleted_before: Option<DateTime<Utc>>,
}
