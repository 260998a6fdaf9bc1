use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Lifecycle state of an attachment.
///
/// Pre-upload attachments move `uploading → ready → linked`; URL-ingested
/// attachments move `downloading → ready/failed`. Unlinked attachments
/// expire after `expires_at` and are removed by the cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    Uploading,
    Downloading,
    Ready,
    Failed,
    Linked,
}

impl AttachmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentStatus::Uploading => "uploading",
            AttachmentStatus::Downloading => "downloading",
            AttachmentStatus::Ready => "ready",
            AttachmentStatus::Failed => "failed",
            AttachmentStatus::Linked => "linked",
        }
    }
}

impl std::str::FromStr for AttachmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(AttachmentStatus::Uploading),
            "downloading" => Ok(AttachmentStatus::Downloading),
            "ready" => Ok(AttachmentStatus::Ready),
            "failed" => Ok(AttachmentStatus::Failed),
            "linked" => Ok(AttachmentStatus::Linked),
            _ => Err(format!("Invalid attachment status: {}", s)),
        }
    }
}

/// Attachment metadata. The payload bytes live in the blob store under
/// `storage_key`; this row only tracks identity and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<Uuid>,
    pub status: AttachmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip)]
    pub storage_key: Option<String>,
    /// TTL while unlinked; cleared on link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create an attachment, either for direct upload or by
/// ingesting from a URL.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachment {
    #[validate(length(min = 1, max = 127))]
    pub content_type: Option<String>,
    /// Source URL for server-side download ingestion.
    #[validate(url)]
    pub source_url: Option<String>,
}
