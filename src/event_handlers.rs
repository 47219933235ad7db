//! Connection lifecycle event handlers for doclink sessions.
//!
//! Provides callback-based hooks for monitoring the session:
//!
//! - [`on_connect`](EventHandlers::on_connect): First successful connection
//! - [`on_reconnect`](EventHandlers::on_reconnect): Connection restored after a loss
//! - [`on_disconnect`](EventHandlers::on_disconnect): Connection closed or lost
//! - [`on_error`](EventHandlers::on_error): Transport or replay errors
//! - [`on_state_change`](EventHandlers::on_state_change): Every state transition
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   Optional debug hooks for raw frames
//!
//! Handlers run on the session task, so they must not block.
//!
//! # Example
//!
//! ```rust,no_run
//! use doclink::{DocLinkClient, EventHandlers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("Connected!"))
//!     .on_disconnect(|reason| println!("Disconnected: {}", reason))
//!     .on_error(|error| eprintln!("Connection error: {}", error));
//!
//! let client = DocLinkClient::builder()
//!     .url("ws://localhost:7512")
//!     .event_handlers(handlers)
//!     .build()?;
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

use crate::models::ConnectionState;
use std::fmt;
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// Close code, if the transport reported one (e.g. 1000 = normal, 1006 = abnormal).
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

/// Type alias for the on_connect / on_reconnect callbacks.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_state_change callback (`from`, `to`).
pub type OnStateChangeCallback = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// Type alias for the raw frame debug hooks.
pub type OnFrameCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Session lifecycle event handlers.
///
/// All handlers are optional. The builder pattern makes it easy to register
/// only the handlers you need.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_reconnect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_state_change: Option<OnStateChangeCallback>,
    pub(crate) on_receive: Option<OnFrameCallback>,
    pub(crate) on_send: Option<OnFrameCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the session first reaches CONNECTED.
    ///
    /// # Example
    /// ```rust
    /// use doclink::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_connect(|| println!("Connected!"));
    /// ```
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the session reaches CONNECTED again
    /// after a lost connection. The offline queue has already been flushed
    /// and room replay issued when this fires.
    pub fn on_reconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the connection is closed or lost.
    ///
    /// # Example
    /// ```rust
    /// use doclink::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_disconnect(|reason| println!("Disconnected: {}", reason));
    /// ```
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connection or replay error occurs.
    ///
    /// The callback receives a [`ConnectionError`] indicating whether the
    /// error is recoverable (auto-reconnect may help) or fatal.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked on every connection state transition.
    ///
    /// # Example
    /// ```rust
    /// use doclink::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_state_change(|from, to| println!("{} -> {}", from, to));
    /// ```
    pub fn on_state_change(
        mut self,
        f: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw frame received from the backend.
    ///
    /// This is a **debug/tracing hook**. Not needed for normal operation.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every raw frame sent to the backend.
    ///
    /// This is a **debug/tracing hook**. Not needed for normal operation.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_reconnect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_state_change.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_reconnect(&self) {
        if let Some(cb) = &self.on_reconnect {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_state_change(&self, from: ConnectionState, to: ConnectionState) {
        if let Some(cb) = &self.on_state_change {
            cb(from, to);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &[u8]) {
        if let Some(cb) = &self.on_receive {
            cb(&String::from_utf8_lossy(raw));
        }
    }

    pub(crate) fn emit_send(&self, raw: &[u8]) {
        if let Some(cb) = &self.on_send {
            cb(&String::from_utf8_lossy(raw));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::new("bye").to_string(), "bye");
        assert_eq!(
            DisconnectReason::with_code("abnormal", 1006).to_string(),
            "abnormal (code: 1006)"
        );
    }

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        // Dispatching with nothing registered is a no-op.
        handlers.emit_connect();
        handlers.emit_error(ConnectionError::new("x", true));
    }

    #[test]
    fn test_handlers_fire() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = hits.clone();
        let h2 = hits.clone();
        let handlers = EventHandlers::new()
            .on_connect(move || {
                h1.fetch_add(1, Ordering::SeqCst);
            })
            .on_state_change(move |from, to| {
                assert_eq!(from, ConnectionState::Connecting);
                assert_eq!(to, ConnectionState::Connected);
                h2.fetch_add(10, Ordering::SeqCst);
            });
        assert!(handlers.has_any());
        handlers.emit_connect();
        handlers.emit_state_change(ConnectionState::Connecting, ConnectionState::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }
}
