//! Realtime change feeds.
//!
//! A [`Realtime`] implementation opens named channels described by a
//! [`ChannelSpec`](crate::ChannelSpec) and hands back a [`Subscription`].
//! [`watch`] drives a subscription from a background task into a
//! [`ChangeHandler`].

pub mod connection;
pub mod dedup;
pub mod subscription;
pub mod watcher;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ChannelSpec;

pub use connection::RealtimeConnection;
pub use dedup::SeenEvents;
pub use subscription::Subscription;
pub use watcher::{watch, ChangeHandler, FnHandler, Watch};

/// Source of realtime row changes.
#[async_trait]
pub trait Realtime: Send + Sync {
    /// Open the channel described by `spec`.
    ///
    /// Fails with `ChannelError` while another channel with the same name
    /// is still open.
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription>;
}
