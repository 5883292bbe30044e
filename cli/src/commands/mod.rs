pub mod mark_read;
pub mod notifications;
pub mod social;
pub mod unread;
pub mod watch;
