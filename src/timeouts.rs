//! Timeout configuration for doclink sessions.
//!
//! Centralizes every deadline the session enforces: connection attempts,
//! per-request response deadlines, room subscribe acknowledgments and the
//! WebSocket keepalive interval.

use std::time::Duration;

/// Timeout configuration for doclink sessions.
///
/// # Examples
///
/// ```rust
/// use doclink::DocLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = DocLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = DocLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .request_timeout(Duration::from_secs(120))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = DocLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct DocLinkTimeouts {
    /// Timeout for a single connection attempt (initial connect or reconnect).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Deadline for a response once a request reaches the transport.
    /// Set to 0 to wait indefinitely.
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Deadline for a room subscribe or unsubscribe acknowledgment.
    /// Set to 0 to wait indefinitely.
    /// Default: 10 seconds
    pub subscribe_timeout: Duration,

    /// Keep-alive ping interval used by the WebSocket transport.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 10 seconds
    pub keepalive_interval: Duration,
}

impl Default for DocLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(10),
        }
    }
}

impl DocLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> DocLinkTimeoutsBuilder {
        DocLinkTimeoutsBuilder::new()
    }

    /// Create timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(15),
        }
    }

    /// Create timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            subscribe_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
        }
    }

    /// Create timeouts suitable for tests that drive a scripted transport.
    ///
    /// Keepalive is disabled so no background pings interleave with
    /// the frames a test asserts on.
    pub fn for_testing(request_timeout_secs: u64) -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(request_timeout_secs),
            subscribe_timeout: Duration::from_secs(request_timeout_secs),
            keepalive_interval: Duration::ZERO,
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }

    /// Convert a configured duration to an optional deadline length.
    pub(crate) fn as_deadline(duration: Duration) -> Option<Duration> {
        if Self::is_no_timeout(duration) {
            None
        } else {
            Some(duration)
        }
    }
}

/// Builder for creating custom [`DocLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct DocLinkTimeoutsBuilder {
    timeouts: DocLinkTimeouts,
}

impl DocLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: DocLinkTimeouts::default(),
        }
    }

    /// Set the connection attempt timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection attempt timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the per-request response deadline.
    /// Set to 0 to wait indefinitely.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the per-request response deadline in seconds.
    pub fn request_timeout_secs(self, secs: u64) -> Self {
        self.request_timeout(Duration::from_secs(secs))
    }

    /// Set the room subscribe acknowledgment timeout.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the room subscribe acknowledgment timeout in seconds.
    pub fn subscribe_timeout_secs(self, secs: u64) -> Self {
        self.subscribe_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval.
    /// Set to 0 to disable keepalive pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the keepalive ping interval in seconds.
    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> DocLinkTimeouts {
        self.timeouts
    }
}
