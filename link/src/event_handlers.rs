//! Connection lifecycle event handlers for the Venered client.
//!
//! Provides callback-based hooks for monitoring WebSocket connection events:
//!
//! - [`on_connect`](EventHandlers::on_connect): Fired when WebSocket connection is established
//! - [`on_disconnect`](EventHandlers::on_disconnect): Fired when WebSocket connection closes
//! - [`on_error`](EventHandlers::on_error): Fired on connection or protocol errors
//! - [`on_receive`](EventHandlers::on_receive): Optional debug hook for all incoming messages
//! - [`on_send`](EventHandlers::on_send): Optional debug hook for all outgoing messages
//! - [`on_alert`](EventHandlers::on_alert): Fired when a new message or notification lands
//!
//! # Example
//!
//! ```rust,no_run
//! use venered_link::{VeneredLinkClient, EventHandlers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|| {
//!         println!("Realtime connected");
//!     })
//!     .on_disconnect(|reason| {
//!         println!("Disconnected: {}", reason);
//!     })
//!     .on_error(|error| {
//!         eprintln!("Connection error: {}", error);
//!     })
//!     .on_alert(|cue| {
//!         print!("\x07new row in {}", cue.table);
//!     });
//!
//! let client = VeneredLinkClient::builder()
//!     .base_url("https://project.supabase.co")
//!     .api_key("anon-key")
//!     .event_handlers(handlers)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Create a new disconnect reason with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Create a new disconnect reason with a message and close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is recoverable (i.e. auto-reconnect may succeed).
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Audible-cue stand-in: a new unread row arrived on `messages` or
/// `notifications` for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCue {
    /// Table the insert landed in.
    pub table: String,
    /// Primary key of the inserted row, when the payload carried one.
    pub row_id: Option<String>,
}

impl AlertCue {
    pub fn new(table: impl Into<String>, row_id: Option<String>) -> Self {
        Self {
            table: table.into(),
            row_id,
        }
    }
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_receive callback (debug hook for all inbound messages).
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Type alias for the on_send callback (debug hook for all outbound messages).
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Type alias for the on_alert callback.
pub type OnAlertCallback = Arc<dyn Fn(AlertCue) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional. The builder pattern makes it easy to register
/// only the handlers you need. Handlers are `Send + Sync` so they work with
/// the async tokio runtime.
#[derive(Clone, Default)]
pub struct EventHandlers {
    /// Called when the WebSocket connection is successfully established.
    pub(crate) on_connect: Option<OnConnectCallback>,

    /// Called when the WebSocket connection is closed (intentionally or not).
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,

    /// Called when a connection or protocol error occurs.
    pub(crate) on_error: Option<OnErrorCallback>,

    /// Called for every raw message received from the server (debug/tracing).
    pub(crate) on_receive: Option<OnReceiveCallback>,

    /// Called for every raw message sent to the server (debug/tracing).
    pub(crate) on_send: Option<OnSendCallback>,

    /// Called when an unread message or notification is inserted.
    pub(crate) on_alert: Option<OnAlertCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .field("on_alert", &self.on_alert.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the WebSocket connection is established.
    ///
    /// # Example
    /// ```rust
    /// use venered_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_connect(|| println!("Connected!"));
    /// ```
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the WebSocket connection is closed.
    ///
    /// The callback receives a [`DisconnectReason`] with details about why
    /// the connection was closed.
    ///
    /// # Example
    /// ```rust
    /// use venered_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_disconnect(|reason| println!("Disconnected: {}", reason));
    /// ```
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connection error occurs.
    ///
    /// The callback receives a [`ConnectionError`] indicating whether the
    /// error is recoverable (auto-reconnect may help) or fatal.
    ///
    /// # Example
    /// ```rust
    /// use venered_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_error(|err| eprintln!("Error (recoverable={}): {}", err.recoverable, err));
    /// ```
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw message received from the server.
    ///
    /// Debug hook: receives the raw JSON of every inbound Phoenix frame
    /// before parsing. Not needed for normal operation.
    ///
    /// # Example
    /// ```rust
    /// use venered_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_receive(|msg| println!("[RECV] {}", msg));
    /// ```
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw message sent to the server.
    ///
    /// Debug hook: receives the raw JSON of every outbound Phoenix frame,
    /// heartbeats included.
    ///
    /// # Example
    /// ```rust
    /// use venered_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_send(|msg| println!("[SEND] {}", msg));
    /// ```
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when an unread message or notification
    /// is inserted for the signed-in user.
    ///
    /// # Example
    /// ```rust
    /// use venered_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_alert(|cue| println!("\x07{}", cue.table));
    /// ```
    pub fn on_alert(mut self, f: impl Fn(AlertCue) + Send + Sync + 'static) -> Self {
        self.on_alert = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
            || self.on_alert.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    /// Dispatch the on_connect event.
    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    /// Dispatch the on_disconnect event.
    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    /// Dispatch the on_error event.
    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    /// Dispatch the on_receive event.
    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    /// Dispatch the on_send event.
    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }

    /// Dispatch the on_alert event.
    pub(crate) fn emit_alert(&self, cue: AlertCue) {
        if let Some(cb) = &self.on_alert {
            cb(cue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_handlers_have_nothing() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_alert(AlertCue::new("messages", None));
    }

    #[test]
    fn test_alert_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let handlers = EventHandlers::new().on_alert(move |cue| {
            assert_eq!(cue.table, "notifications");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handlers.has_any());
        handlers.emit_alert(AlertCue::new("notifications", Some("n1".into())));
        handlers.emit_alert(AlertCue::new("notifications", None));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::new("bye").to_string(), "bye");
        assert_eq!(
            DisconnectReason::with_code("closed", 1006).to_string(),
            "closed (code: 1006)"
        );
    }
}
