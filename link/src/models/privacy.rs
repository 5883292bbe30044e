use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user privacy switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub user_id: Uuid,
    pub hide_email: bool,
    pub hide_followers_count: bool,
    pub hide_following_count: bool,
    pub hide_location: bool,
    pub hide_posts_count: bool,
    pub hide_website: bool,
    pub private_posts: bool,
    pub allow_message_from_strangers: bool,
    pub show_online_status: bool,
}

impl PrivacySettings {
    /// The row created for a user who never saved settings.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            hide_email: true,
            hide_followers_count: false,
            hide_following_count: false,
            hide_location: false,
            hide_posts_count: false,
            hide_website: false,
            private_posts: false,
            allow_message_from_strangers: true,
            show_online_status: true,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrivacyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_email: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_followers_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_following_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_location: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_posts_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_website: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_posts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_message_from_strangers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_online_status: Option<bool>,
}

impl PrivacyPatch {
    pub fn is_empty(&self) -> bool {
        self == &PrivacyPatch::default()
    }
}
