use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Access level on a conversation group.
///
/// Levels are totally ordered: `Reader < Writer < Manager < Owner`. The
/// derived `Ord` relies on variant declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Reader,
    Writer,
    Manager,
    Owner,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Reader => "reader",
            AccessLevel::Writer => "writer",
            AccessLevel::Manager => "manager",
            AccessLevel::Owner => "owner",
        }
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" => Ok(AccessLevel::Reader),
            "writer" => Ok(AccessLevel::Writer),
            "manager" => Ok(AccessLevel::Manager),
            "owner" => Ok(AccessLevel::Owner),
            _ => Err(format!("Invalid access level: {}", s)),
        }
    }
}

/// A user's membership in a conversation group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMembership {
    pub conversation_group_id: Uuid,
    pub user_id: String,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to grant or change a membership.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertMembership {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    pub access_level: AccessLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_totally_ordered() {
        assert!(AccessLevel::Reader < AccessLevel::Writer);
        assert!(AccessLevel::Writer < AccessLevel::Manager);
        assert!(AccessLevel::Manager < AccessLevel::Owner);
    }

    #[test]
    fn access_level_round_trips_through_str() {
        for level in [
            AccessLevel::Reader,
            AccessLevel::Writer,
            AccessLevel::Manager,
            AccessLevel::Owner,
        ] {
            assert_eq!(level.as_str().parse::<AccessLevel>().unwrap(), level);
        }
    }
}
