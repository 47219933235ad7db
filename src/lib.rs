//! # doclink
//!
//! Client session and real-time room manager for document backends.
//!
//! A [`DocLinkClient`] owns one logical session: a long-lived connection that
//! survives network interruptions. It tracks requests awaiting a response,
//! queues requests issued while offline, deduplicates identical real-time
//! subscriptions into shared rooms, and replays those rooms after every
//! reconnection.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use doclink::{DocLinkClient, QueryOptions, Request, SubscribeOptions};
//! use serde_json::json;
//!
//! # async fn example() -> doclink::Result<()> {
//! let client = DocLinkClient::builder()
//!     .url("ws://localhost:7512")
//!     .build()?;
//! client.connect().await?;
//!
//! let room = client
//!     .subscribe("messages", json!({}), SubscribeOptions::new(), |n| {
//!         println!("{:?}: {}", n.action, n.result);
//!     })
//!     .await?;
//!
//! client
//!     .query(
//!         Request::new("document", "create")
//!             .with_collection("messages")
//!             .with_body(json!({"text": "hi"})),
//!         QueryOptions::default(),
//!     )
//!     .await?;
//!
//! room.unsubscribe().await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod backoff;
pub mod client;
pub(crate) mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub(crate) mod offline_queue;
pub mod subscription;
pub mod timeouts;
pub(crate) mod tracker;
pub mod transport;

// Re-export main types for convenience
pub use client::{DocLinkClient, DocLinkClientBuilder};
pub use error::{DocLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    ConnectionOptions, ConnectionState, ErrorDetail, Notification, NotificationType,
    QueryOptions, QueuePolicy, Request, Response, RoomInfo, RoomState, SubscribeOptions,
    SubscribeScope, UserScope,
};
pub use subscription::{NotificationHandler, RoomHandle, RoomSubscription};
pub use timeouts::{DocLinkTimeouts, DocLinkTimeoutsBuilder};
pub use transport::{Transport, TransportEvent, TransportEventSender, WebSocketTransport};

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
