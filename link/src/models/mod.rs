//! Data models for the venered-link client library.
//!
//! Typed table rows decoded at the REST and realtime boundaries, plus the
//! realtime channel and frame structures.

pub mod change_event;
pub mod channel_spec;
pub mod connection_options;
pub mod conversation;
pub mod follow;
pub mod login;
pub mod message;
pub mod moderation;
pub mod notification;
pub mod post;
pub mod privacy;
pub mod profile;
pub mod realtime_frame;
pub mod row_filter;
pub mod table;


pub use change_event::{ChangeEvent, ChangeKind, RealtimeEvent};
pub use channel_spec::{ChangeBinding, ChannelSpec, EventSelector};
pub use connection_options::ConnectionOptions;
pub use conversation::Conversation;
pub use follow::{Follow, FollowStatus};
pub use login::{LoginRequest, LoginResponse, LoginUserInfo};
pub use message::{Message, MessageTyping, NewMessage};
pub use moderation::BannedUser;
pub use notification::{Notification, NotificationItem, NotificationKind};
pub use post::{Comment, Like, Post, PostSummary};
pub use privacy::{PrivacyPatch, PrivacySettings};
pub use profile::ProfileSummary;
pub use realtime_frame::PhoenixFrame;
pub use row_filter::{FilterOp, RowFilter};
pub use table::Table;

use serde::{Deserialize, Deserializer};

/// Nullable boolean columns decode to `false`.
pub(crate) fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Nullable columns decode to the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
