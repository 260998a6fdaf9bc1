use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Entry;

/// Search routing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Semantic first, full-text fallback on zero results.
    #[default]
    Auto,
    Semantic,
    Fulltext,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Auto => "auto",
            SearchType::Semantic => "semantic",
            SearchType::Fulltext => "fulltext",
        }
    }
}

/// Search request over the caller's accessible conversations.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,
    #[serde(default)]
    pub search_type: SearchType,
    pub limit: Option<i64>,
    /// Restrict to specific conversations (still access-checked).
    pub conversation_ids: Option<Vec<Uuid>>,
    /// Hydrate the full entry on each result.
    #[serde(default)]
    pub include_entry: bool,
    /// Collapse results to the best hit per conversation.
    #[serde(default)]
    pub group_by_conversation: bool,
}

/// One search hit. `entry_id` is always present at top level for
/// deep-linking; highlights derive from `indexed_content`, not from the
/// encrypted entry content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub entry_id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_group_id: Uuid,
    pub score: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Entry>,
}

/// Search response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Which search type actually served the request.
    pub search_type: SearchType,
}

/// One element of a batch index submission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IndexSubmission {
    pub conversation_id: Uuid,
    pub entry_id: Uuid,
    #[validate(length(min = 1, max = 100000))]
    pub indexed_content: String,
}

/// Batch index request (indexer role).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IndexRequest {
    #[validate(nested, length(min = 1, max = 1000))]
    pub entries: Vec<IndexSubmission>,
}
