//! Session lifecycle.
//!
//! This module contains:
//! - [`state_machine`]: the synchronous [`ConnectionStateMachine`] that owns
//!   every table (pending requests, offline queue, rooms) and decides each
//!   transition
//! - [`task`]: the background event loop feeding commands, transport events
//!   and timers into the state machine one at a time

pub(crate) mod state_machine;
pub(crate) mod task;

pub(crate) use state_machine::ConnectionStateMachine;
pub(crate) use task::run_session;

use crate::error::Result;
use crate::models::{QueryOptions, Request, Response, RoomInfo};
use crate::subscription::room::{Registration, RoomKey, SubscribeWaiter};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::oneshot;

/// Capacity of the command channel between the client and the session task.
pub(crate) const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);

/// How the caller of a query wants to be answered.
pub(crate) enum QueryReply {
    /// Resolve with the response.
    Response(oneshot::Sender<Result<Response>>),
    /// Resolve as soon as the request is sent or queued; drop the response.
    Accepted(oneshot::Sender<Result<()>>),
}

/// Commands sent from the public API to the session task.
pub(crate) enum SessionCmd {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Query {
        request: Request,
        options: QueryOptions,
        reply: QueryReply,
    },
    Subscribe {
        key: RoomKey,
        volatile: Map<String, JsonValue>,
        registration: Registration,
        reply: SubscribeWaiter,
    },
    Unsubscribe {
        room_id: String,
        callback_id: u64,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    ListRooms {
        reply: oneshot::Sender<Vec<RoomInfo>>,
    },
    QueueLen {
        reply: oneshot::Sender<usize>,
    },
    ClearQueue {
        reply: oneshot::Sender<usize>,
    },
}
