use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::post::PostSummary;
use super::profile::ProfileSummary;

/// Value of the notification `type` column.
///
/// Unknown kinds decode to [`NotificationKind::Other`] so new backend
/// triggers never break decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Message,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Message => "message",
            NotificationKind::Other(kind) => kind,
        }
    }

    /// Message notifications are counted by the messages badge, never by
    /// the notifications badge or feed.
    pub fn is_message(&self) -> bool {
        matches!(self, NotificationKind::Message)
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "like" => NotificationKind::Like,
            "comment" => NotificationKind::Comment,
            "follow" => NotificationKind::Follow,
            "message" => NotificationKind::Message,
            _ => NotificationKind::Other(value),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification row, created by backend triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "super::null_as_false")]
    pub read: bool,
    #[serde(default)]
    pub related_user_id: Option<Uuid>,
    #[serde(default)]
    pub related_post_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A feed entry: the notification plus its hydrated relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    #[serde(flatten)]
    pub notification: Notification,
    #[serde(default)]
    pub related_user: Option<ProfileSummary>,
    #[serde(default)]
    pub related_post: Option<PostSummary>,
}

impl NotificationItem {
    /// An item without hydrated relations.
    pub fn bare(notification: Notification) -> Self {
        Self {
            notification,
            related_user: None,
            related_post: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.notification.id
    }

    pub fn is_read(&self) -> bool {
        self.notification.read
    }
}
