use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;
use validator::Validate;

/// A conversation: an ordered sequence of entries inside a group.
///
/// When the fork pointer is set, the conversation inherits its parent's
/// entries strictly before `forked_at_entry_id`; listing reconstructs the
/// visible sequence by ancestry traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub conversation_group_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_at_conversation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_at_entry_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_fork(&self) -> bool {
        self.forked_at_conversation_id.is_some()
    }
}

/// A conversation together with its decrypted group title, for listings
/// and search responses.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithTitle {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Request to create a conversation. The first conversation for a caller
/// creates the enclosing group with the caller as owner.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateConversation {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,
    #[validate(custom(function = "crate::models::validators::validate_metadata"))]
    #[serde(default)]
    pub metadata: Option<Map<String, serde_json::Value>>,
}

/// Request to fork a conversation at a HISTORY entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFork {
    /// The entry to fork before. Must be a HISTORY entry originating from
    /// a user; the fork inherits entries strictly before it.
    pub entry_id: Uuid,
}

/// Query mode for fork-aware entry listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkMode {
    /// Ancestry of the requested conversation (default).
    #[default]
    None,
    /// Union of all entries in every conversation of the group.
    All,
    /// Ancestry of the most-recently-updated fork in the group.
    Latest,
}

impl std::str::FromStr for ForkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ForkMode::None),
            "all" => Ok(ForkMode::All),
            "latest" => Ok(ForkMode::Latest),
            _ => Err(format!("Invalid forks mode: {}", s)),
        }
    }
}
