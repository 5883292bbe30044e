//! Social flows: follows, friendship, privacy, messaging, posts and moderation.
//!
//! Every service is built for one signed-in user ([`AuthContext`]) on top of
//! a [`Backend`]; none of them keep state between calls.
//!
//! [`AuthContext`]: crate::AuthContext
//! [`Backend`]: crate::Backend

pub mod follows;
pub mod friendship;
pub mod messaging;
pub mod moderation;
pub mod posts;
pub mod privacy;

pub use follows::FollowService;
pub use friendship::FriendshipService;
pub use messaging::{Delivery, MessagingService};
pub use moderation::ModerationService;
pub use posts::PostService;
pub use privacy::PrivacyService;
