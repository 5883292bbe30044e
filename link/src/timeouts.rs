//! Timeout configuration for Venered client operations.
//!
//! Covers HTTP requests against the REST surface, the realtime WebSocket
//! handshake, channel joins and the Phoenix heartbeat.

use std::time::Duration;

/// Timeout configuration for Venered client operations.
///
/// # Examples
///
/// ```rust
/// use venered_link::VeneredLinkTimeouts;
/// use std::time::Duration;
///
/// let timeouts = VeneredLinkTimeouts::default();
///
/// let timeouts = VeneredLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .receive_timeout(Duration::from_secs(120))
///     .build();
///
/// let timeouts = VeneredLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct VeneredLinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for a whole HTTP request/response cycle.
    /// Default: 30 seconds
    pub receive_timeout: Duration,

    /// Timeout for writing a frame to the realtime socket.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Timeout for the `phx_reply` acknowledging a channel join.
    /// Default: 5 seconds
    pub subscribe_timeout: Duration,

    /// Interval between Phoenix heartbeats on the `phoenix` topic.
    /// Set to 0 to disable heartbeats.
    /// Default: 25 seconds
    pub heartbeat_interval: Duration,

    /// Maximum time to wait for any frame after a heartbeat was sent.
    /// If nothing arrives within this window the socket is considered dead.
    /// Set to 0 to disable.
    /// Default: 10 seconds
    pub pong_timeout: Duration,
}

impl Default for VeneredLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl VeneredLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> VeneredLinkTimeoutsBuilder {
        VeneredLinkTimeoutsBuilder::new()
    }

    /// Short timeouts for a backend running on localhost.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            receive_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(2),
            subscribe_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(5),
        }
    }

    /// Long timeouts for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(120),
            send_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(20),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for creating custom [`VeneredLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct VeneredLinkTimeoutsBuilder {
    timeouts: VeneredLinkTimeouts,
}

impl VeneredLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: VeneredLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the HTTP receive timeout.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.receive_timeout = timeout;
        self
    }

    /// Set the HTTP receive timeout in seconds.
    pub fn receive_timeout_secs(self, secs: u64) -> Self {
        self.receive_timeout(Duration::from_secs(secs))
    }

    /// Set the socket send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the channel join timeout.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_interval = interval;
        self
    }

    /// Set the heartbeat interval in seconds.
    pub fn heartbeat_interval_secs(self, secs: u64) -> Self {
        self.heartbeat_interval(Duration::from_secs(secs))
    }

    /// Set the pong timeout.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> VeneredLinkTimeouts {
        self.timeouts
    }
}
