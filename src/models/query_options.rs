use std::time::Duration;

/// Per-request options.
///
/// # Example
///
/// ```rust
/// use doclink::QueryOptions;
/// use std::time::Duration;
///
/// let options = QueryOptions::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_queuable(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Whether the request may wait in the offline queue while disconnected.
    /// When `false` it fails immediately with `NotConnected`.
    /// Default: true
    pub queuable: bool,

    /// Override of the session's request timeout. `Some(Duration::ZERO)` waits forever.
    pub timeout: Option<Duration>,

    /// Caller-chosen correlation id. Must be unique among in-flight requests.
    pub request_id: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            queuable: true,
            timeout: None,
            request_id: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queuable(mut self, queuable: bool) -> Self {
        self.queuable = queuable;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
