use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Semantic channel of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// User / agent turns.
    History,
    /// Agent-scoped short-term state, consolidated per epoch.
    Memory,
    /// Agent-internal records.
    Agent,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::History => "HISTORY",
            Channel::Memory => "MEMORY",
            Channel::Agent => "AGENT",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HISTORY" => Ok(Channel::History),
            "MEMORY" => Ok(Channel::Memory),
            "AGENT" => Ok(Channel::Agent),
            _ => Err(format!("Invalid channel: {}", s)),
        }
    }
}

/// One block of entry content.
///
/// HISTORY entries carry role-tagged text blocks; MEMORY entries may carry
/// either text blocks or structured data blocks. Blocks are compared for
/// equality by the MEMORY sync prefix matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { role: String, text: String },
    Data { value: serde_json::Value },
}

impl ContentBlock {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        ContentBlock::Text {
            role: role.into(),
            text: text.into(),
        }
    }

    /// The textual payload of the block, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, .. } => Some(text),
            ContentBlock::Data { .. } => None,
        }
    }

    /// The role tag of the block, if any.
    pub fn role(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { role, .. } => Some(role),
            ContentBlock::Data { .. } => None,
        }
    }
}

/// Content type assigned to synthetic fork-step entries emitted at the
/// join points of fork-aware listings.
pub const FORK_STEP_CONTENT_TYPE: &str = "application/vnd.engram.fork-step";

/// An immutable, channel-tagged content record in a conversation.
///
/// Entries are never updated after creation; a new entry supersedes a
/// prior one. Content is stored encrypted; `indexed_content` is plaintext
/// and exists only on HISTORY entries that opted into indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_group_id: Uuid,
    pub channel: Channel,
    /// Null for user-originated entries, set for agent-originated ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub content_type: String,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    /// Monotonic per (conversation, MEMORY, client_id); 0 elsewhere.
    pub epoch: i64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// Whether this is a synthetic fork-step entry produced at read time.
    pub fn is_fork_step(&self) -> bool {
        self.content_type == FORK_STEP_CONTENT_TYPE
    }

    /// Whether the entry originated from a user (no client id).
    pub fn is_user_originated(&self) -> bool {
        self.client_id.is_none()
    }

    /// Concatenated text of all text blocks, used for title derivation.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Request to append an entry to a conversation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntry {
    pub channel: Channel,
    #[validate(length(min = 1, max = 127))]
    pub content_type: String,
    #[validate(length(min = 1))]
    pub content: Vec<ContentBlock>,
    /// Plaintext used for search indexing. HISTORY only.
    #[validate(length(max = 100000))]
    pub indexed_content: Option<String>,
}

/// Request to sync MEMORY content for (conversation, client).
///
/// The supplied list replaces the latest MEMORY epoch's consolidated
/// content: a strict extension appends the delta at the same epoch, a
/// divergence starts a new epoch.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SyncMemory {
    #[validate(length(min = 1, max = 127))]
    pub content_type: String,
    pub content: Vec<ContentBlock>,
}

/// Outcome of a MEMORY sync.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Id of the entry written, if the sync produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<Uuid>,
    pub epoch: i64,
    pub epoch_incremented: bool,
}
