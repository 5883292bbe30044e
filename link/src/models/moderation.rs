use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row of `banned_users`. Unbanning flips `is_active` off, the row stays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub banned_by: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub banned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "super::null_as_false")]
    pub is_active: bool,
}

impl BannedUser {
    /// Active and not past its expiry.
    pub fn is_in_effect(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires| expires > now)
    }
}
