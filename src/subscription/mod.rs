//! Real-time rooms.
//!
//! - [`room`]: room identity (canonical filters, SHA-256 room id) and per-room state
//! - [`registry`]: the room table and its subscribe/unsubscribe/replay rules
//! - [`router`]: delivery of inbound notifications to room handlers
//! - [`handle`]: [`RoomHandle`] and [`RoomSubscription`] returned to callers

pub mod handle;
pub(crate) mod registry;
pub(crate) mod room;
pub(crate) mod router;

pub use handle::{RoomHandle, RoomSubscription};
pub use room::NotificationHandler;
