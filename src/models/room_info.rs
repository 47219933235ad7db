//! Room metadata exposed to callers.
//!
//! [`RoomInfo`] provides a read-only snapshot of a room's state, useful for
//! debugging, tests, and UI dashboards.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// First subscribe issued (or waiting for a connection), not acknowledged yet
    Subscribing,
    /// Acknowledged by the backend; notifications are delivered
    Active,
    /// Replayed after a reconnection, acknowledgment pending
    Resubscribing,
    /// Last handler left while a subscribe was outstanding
    Cancelled,
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoomState::Subscribing => "subscribing",
            RoomState::Active => "active",
            RoomState::Resubscribing => "resubscribing",
            RoomState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of a room.
///
/// Returned by [`DocLinkClient::rooms()`](crate::DocLinkClient::rooms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Client-side room id derived from the subscription parameters.
    pub room_id: String,
    pub collection: String,
    pub filters: JsonValue,
    pub subscribe_to_self: bool,
    pub state: RoomState,
    /// Backend channel, once acknowledged.
    pub channel: Option<String>,
    /// Number of registered handlers.
    pub handler_count: usize,
    /// Whether a subscribe call is currently in flight.
    pub subscribe_in_flight: bool,
    /// Millis since Unix epoch when the room was created.
    pub created_at_ms: u64,
    /// Millis since Unix epoch of the last delivered notification.
    pub last_notification_ms: Option<u64>,
}
