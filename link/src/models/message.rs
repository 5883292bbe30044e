use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direct message between two users. Only `read` ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Absent or null means unread.
    #[serde(default, deserialize_with = "super::null_as_false")]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for inserting a message; id, read and created_at come from the backend.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Row of `message_typing`, upserted on `(sender_id, receiver_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTyping {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}
