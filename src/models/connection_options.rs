use serde::{Deserialize, Serialize};

use crate::error::{DocLinkError, Result};

use super::queue_policy::QueuePolicy;

/// Session-level options controlling reconnection and offline behavior.
///
/// These options control:
/// - Automatic reconnection on connection loss and its backoff bounds
/// - Whether requests issued while disconnected are queued or rejected
/// - Offline queue capacity, admission policy and TTL
/// - The default subscribe-to-self flag for new rooms
///
/// Every field has a serde default so partial configuration documents load.
///
/// # Example
///
/// ```rust
/// use doclink::{ConnectionOptions, QueuePolicy};
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10))
///     .with_offline_queue_capacity(100)
///     .with_queue_policy(QueuePolicy::RejectNewest);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay in milliseconds before the first reconnection attempt
    /// Default: 1000ms. Doubles per failed attempt up to max_reconnect_delay_ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum delay between reconnection attempts
    /// Default: 30000ms (30 seconds)
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Relative jitter applied to each backoff delay (0.2 = +/-20%)
    /// Default: 0.2
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,

    /// Maximum number of reconnection attempts before giving up
    /// Default: None (infinite retries)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Queue requests issued while not connected instead of failing them
    /// Default: true
    #[serde(default = "default_offline_queue")]
    pub offline_queue: bool,

    /// Maximum number of requests held by the offline queue
    /// Default: 500
    #[serde(default = "default_offline_queue_capacity")]
    pub offline_queue_capacity: usize,

    /// What to do when the offline queue is full
    /// Default: EvictOldest
    #[serde(default)]
    pub queue_policy: QueuePolicy,

    /// Time a request may wait in the offline queue, in milliseconds.
    /// Set to `0` to keep queued requests until the next connection.
    /// Default: 120000ms (2 minutes)
    #[serde(default = "default_queue_ttl_ms")]
    pub queue_ttl_ms: u64,

    /// Default for rooms that do not set `subscribe_to_self` explicitly:
    /// whether notifications caused by this client's own requests are delivered.
    /// Default: true
    #[serde(default = "default_subscribe_to_self")]
    pub subscribe_to_self: bool,
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

fn default_reconnect_jitter() -> f64 {
    0.2
}

fn default_offline_queue() -> bool {
    true
}

fn default_offline_queue_capacity() -> usize {
    500
}

fn default_queue_ttl_ms() -> u64 {
    120_000
}

fn default_subscribe_to_self() -> bool {
    true
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30000,
            reconnect_jitter: 0.2,
            max_reconnect_attempts: None,
            offline_queue: true,
            offline_queue_capacity: 500,
            queue_policy: QueuePolicy::default(),
            queue_ttl_ms: 120_000,
            subscribe_to_self: true,
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
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

    /// Set the relative backoff jitter (`0.0` disables jitter)
    pub fn with_reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the maximum number of reconnection attempts
    /// Pass None for infinite retries
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Enable or disable the offline queue
    pub fn with_offline_queue(mut self, enabled: bool) -> Self {
        self.offline_queue = enabled;
        self
    }

    /// Set the offline queue capacity
    pub fn with_offline_queue_capacity(mut self, capacity: usize) -> Self {
        self.offline_queue_capacity = capacity;
        self
    }

    /// Set the admission policy used when the offline queue is full
    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    /// Set the offline queue TTL in milliseconds (`0` disables expiry)
    pub fn with_queue_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.queue_ttl_ms = ttl_ms;
        self
    }

    /// Set the default subscribe-to-self flag for new rooms
    pub fn with_subscribe_to_self(mut self, enabled: bool) -> Self {
        self.subscribe_to_self = enabled;
        self
    }

    /// Reject option combinations that cannot produce a sane backoff.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(DocLinkError::ConfigurationError(format!(
                "reconnect_delay_ms ({}) exceeds max_reconnect_delay_ms ({})",
                self.reconnect_delay_ms, self.max_reconnect_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.reconnect_jitter) {
            return Err(DocLinkError::ConfigurationError(format!(
                "reconnect_jitter must be within [0, 1], got {}",
                self.reconnect_jitter
            )));
        }
        Ok(())
    }
}
