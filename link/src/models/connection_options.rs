use serde::{Deserialize, Serialize};

/// Connection-level options for the realtime socket.
///
/// These control reconnection after the socket drops and the size of the
/// per-subscription duplicate-event window.
///
/// # Example
///
/// ```rust
/// use venered_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay in milliseconds between reconnection attempts
    /// Default: 1000ms, doubled per attempt up to max_reconnect_delay_ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum delay between reconnection attempts
    /// Default: 30000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts before giving up
    /// Default: None (infinite retries). Some(0) disables reconnection.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// How many recent event keys each subscription remembers for
    /// duplicate suppression.
    /// Default: 256
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_dedup_window() -> usize {
    256
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30000,
            max_reconnect_attempts: None,
            dedup_window: 256,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the initial delay between reconnection attempts (in milliseconds)
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the maximum delay between reconnection attempts (in milliseconds)
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Pass None for infinite retries, Some(0) to disable reconnection
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// Backoff before reconnect attempt `attempt` (0-based):
    /// `min(reconnect_delay_ms * 2^attempt, max_reconnect_delay_ms)`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.reconnect_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_reconnect_delay_ms)
    }

    /// Whether another reconnect attempt is allowed after `attempts` failures.
    pub fn may_reconnect(&self, attempts: u32) -> bool {
        self.auto_reconnect && self.max_reconnect_attempts.map_or(true, |max| attempts < max)
    }
}
