use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend tables the client reads, writes or watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Messages,
    Notifications,
    Posts,
    Likes,
    Comments,
    Follows,
    Profiles,
    PrivacySettings,
    BannedUsers,
    AdminRoles,
    MessageTyping,
}

impl Table {
    /// Name as used in REST paths and realtime bindings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Messages => "messages",
            Table::Notifications => "notifications",
            Table::Posts => "posts",
            Table::Likes => "likes",
            Table::Comments => "comments",
            Table::Follows => "follows",
            Table::Profiles => "profiles",
            Table::PrivacySettings => "privacy_settings",
            Table::BannedUsers => "banned_users",
            Table::AdminRoles => "admin_roles",
            Table::MessageTyping => "message_typing",
        }
    }

    /// Inserts on these tables raise an alert cue.
    pub fn raises_alert(&self) -> bool {
        matches!(self, Table::Messages | Table::Notifications)
    }

    pub fn parse(name: &str) -> Option<Table> {
        let table = match name {
            "messages" => Table::Messages,
            "notifications" => Table::Notifications,
            "posts" => Table::Posts,
            "likes" => Table::Likes,
            "comments" => Table::Comments,
            "follows" => Table::Follows,
            "profiles" => Table::Profiles,
            "privacy_settings" => Table::PrivacySettings,
            "banned_users" => Table::BannedUsers,
            "admin_roles" => Table::AdminRoles,
            "message_typing" => Table::MessageTyping,
            _ => return None,
        };
        Some(table)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
