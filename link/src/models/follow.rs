use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    #[default]
    Accepted,
    Pending,
    #[serde(other)]
    Unknown,
}

impl FollowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowStatus::Accepted => "accepted",
            FollowStatus::Pending => "pending",
            FollowStatus::Unknown => "unknown",
        }
    }
}

/// Directed follow edge `follower_id -> following_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub id: Uuid,
    pub follower_id: Uuid,
    pub following_id: Uuid,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub status: FollowStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
