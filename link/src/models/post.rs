use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The post columns a notification hydrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub image_urls: Vec<String>,
}

impl PostSummary {
    pub const COLUMNS: &'static [&'static str] = &["id", "content", "image_urls"];
}

/// A post row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub image_urls: Vec<String>,
    #[serde(default, deserialize_with = "super::null_as_false")]
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// One user's like on one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
