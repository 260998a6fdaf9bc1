use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// State of an ownership transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Accepted,
    Cancelled,
    Expired,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Accepted => "accepted",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "accepted" => Ok(TransferStatus::Accepted),
            "cancelled" => Ok(TransferStatus::Cancelled),
            "expired" => Ok(TransferStatus::Expired),
            _ => Err(format!("Invalid transfer status: {}", s)),
        }
    }
}

/// An ownership-transfer offer for a conversation group.
///
/// At most one pending transfer exists per group. Accepting swaps the
/// owner and downgrades the prior owner to manager in one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipTransfer {
    pub id: Uuid,
    pub conversation_group_id: Uuid,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Request to create an ownership transfer.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransfer {
    pub conversation_group_id: Uuid,
    /// Must already be a member of the group.
    #[validate(length(min = 1, max = 255))]
    pub new_owner_user_id: String,
}
