//! # venered-link
//!
//! Client library for the Venered social network.
//!
//! The library talks to the hosted backend the web app uses (PostgREST-style
//! HTTP, password-grant auth, Phoenix realtime) and keeps the derived client
//! state those apps carried:
//!
//! - **Realtime**: named channels over one multiplexed WebSocket, with
//!   duplicate deliveries dropped ([`RealtimeConnection`], [`Subscription`]).
//! - **Unread badges**: counters for messages and notifications, seeded from
//!   a count query and kept current from the change feed ([`UnreadCounter`]).
//! - **Notification feed**: the newest 50 notifications, hydrated and
//!   reconciled with every change ([`NotificationFeed`]).
//! - **Social services**: follows, friendship, privacy, messaging and
//!   moderation ([`social`]), plus image upload ([`ImageUploader`]).
//!
//! Everything runs against the [`Backend`] and [`Realtime`] traits, which
//! [`MemoryBackend`] implements in process.
//!
//! ## Example
//!
//! ```rust,no_run
//! use venered_link::{EventHandlers, VeneredLinkClient};
//!
//! # async fn example() -> venered_link::Result<()> {
//! let client = VeneredLinkClient::builder()
//!     .base_url("https://project.supabase.co")
//!     .api_key("anon-key")
//!     .event_handlers(EventHandlers::new().on_alert(|_| print!("\x07")))
//!     .build()?;
//!
//! let auth = client.sign_in("ana@example.com", "secret").await?;
//! let session = client.session(auth).await?;
//!
//! let messages = session.unread_messages();
//! messages.start(session.realtime()).await?;
//! let mut changes = messages.subscribe_count();
//! while changes.changed().await.is_ok() {
//!     println!("unread messages: {}", *changes.borrow());
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod client;
pub mod error;
pub mod event_handlers;
pub mod feed;
pub mod memory;
pub mod models;
pub mod mutation;
pub mod query;
pub mod realtime;
pub mod session;
pub mod social;
pub mod table_query;
pub mod timeouts;
pub mod unread;
pub mod upload;

pub use auth::{AuthContext, AuthProvider};
pub use backend::{call_rpc, fetch_optional, fetch_rows, insert_row, upsert_row, Backend};
pub use client::{VeneredLinkClient, VeneredLinkClientBuilder};
pub use error::{Result, VeneredLinkError};
pub use event_handlers::{AlertCue, ConnectionError, DisconnectReason, EventHandlers};
pub use feed::{NotificationFeed, FEED_WINDOW};
pub use memory::{MemoryBackend, Operation};
pub use models::{
    BannedUser, ChangeBinding, ChangeEvent, ChangeKind, ChannelSpec, Comment, ConnectionOptions,
    Conversation, EventSelector, FilterOp, Follow, FollowStatus, Like, LoginRequest,
    LoginResponse, LoginUserInfo, Message, MessageTyping, NewMessage, Notification,
    NotificationItem, NotificationKind, Post, PostSummary, PrivacyPatch, PrivacySettings,
    ProfileSummary, RealtimeEvent, RowFilter, Table,
};
pub use mutation::{Mutation, MutationState, MutationTracker};
pub use query::RestBackend;
pub use realtime::{
    watch, ChangeHandler, FnHandler, Realtime, RealtimeConnection, SeenEvents, Subscription, Watch,
};
pub use session::Session;
pub use social::{
    Delivery, FollowService, FriendshipService, MessagingService, ModerationService, PostService,
    PrivacyService,
};
pub use table_query::{Filter, OrderBy, TableQuery};
pub use timeouts::VeneredLinkTimeouts;
pub use unread::{
    MessageScope, NotificationScope, UnreadCounter, UnreadMessages, UnreadNotifications,
    UnreadScope,
};
pub use upload::{content_type_for, ImageCategory, ImageUploader, DEFAULT_UPLOAD_ENDPOINT};
