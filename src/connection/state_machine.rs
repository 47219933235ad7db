//! The session state machine.
//!
//! [`ConnectionStateMachine`] is plain synchronous code: the session task
//! hands it one command, transport event or timer tick at a time and it
//! updates its tables, drives the transport and answers callers. Nothing else
//! touches the pending-request table, the offline queue or the rooms.

use super::{QueryReply, SessionCmd};
use crate::backoff::ReconnectBackoff;
use crate::error::{DocLinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{
    parse_frame, ConnectionOptions, ConnectionState, Inbound, QueryOptions, Request, Response,
};
use crate::offline_queue::OfflineQueue;
use crate::subscription::registry::{AckOutcome, SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome};
use crate::subscription::room::{Registration, Room, RoomKey, SubscribeWaiter};
use crate::subscription::router::NotificationRouter;
use crate::timeouts::DocLinkTimeouts;
use crate::tracker::RequestTracker;
use crate::transport::{Transport, TransportEvent, TransportEventSender};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

/// What to do once a tracked request is resolved.
pub(crate) enum Completion {
    /// Caller request; `None` for fire-and-forget sends.
    Caller(Option<oneshot::Sender<Result<Response>>>),
    /// Network subscribe for a room.
    Subscribe { room_id: String },
    /// Network unsubscribe, optionally awaited by a room handle.
    Unsubscribe(Option<oneshot::Sender<Result<()>>>),
}

/// A request parked in the offline queue.
pub(crate) struct QueuedItem {
    request: Request,
    reply: Option<oneshot::Sender<Result<Response>>>,
    timeout: Option<Duration>,
}

impl QueuedItem {
    fn fail(self, err: DocLinkError) {
        match self.reply {
            Some(tx) => {
                let _ = tx.send(Err(err));
            },
            None => log::debug!(
                "[doclink] Dropping fire-and-forget request {}: {}",
                self.request.request_id,
                err
            ),
        }
    }
}

/// Caller of a query, split into the response and acceptance channels.
struct ReplyTo {
    response: Option<oneshot::Sender<Result<Response>>>,
    accepted: Option<oneshot::Sender<Result<()>>>,
}

impl From<QueryReply> for ReplyTo {
    fn from(reply: QueryReply) -> Self {
        match reply {
            QueryReply::Response(tx) => Self {
                response: Some(tx),
                accepted: None,
            },
            QueryReply::Accepted(tx) => Self {
                response: None,
                accepted: Some(tx),
            },
        }
    }
}

impl ReplyTo {
    fn fail(self, err: DocLinkError) {
        if let Some(tx) = self.accepted {
            let _ = tx.send(Err(err.clone()));
        }
        if let Some(tx) = self.response {
            let _ = tx.send(Err(err));
        }
    }

    fn accept(accepted: Option<oneshot::Sender<Result<()>>>) {
        if let Some(tx) = accepted {
            let _ = tx.send(Ok(()));
        }
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) struct ConnectionStateMachine {
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    transport: Box<dyn Transport>,
    transport_open: bool,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    options: ConnectionOptions,
    timeouts: DocLinkTimeouts,
    handlers: EventHandlers,
    tracker: RequestTracker<Completion>,
    /// Subscribe requests that timed out on the current connection; a late
    /// successful ack for one of them is unsubscribed right away.
    timed_out_subscribes: HashSet<String>,
    queue: OfflineQueue<QueuedItem>,
    registry: SubscriptionRegistry,
    router: NotificationRouter,
    sdk_instance_id: String,
    sdk_name: String,
    backoff: ReconnectBackoff,
    reconnect_at: Option<Instant>,
    connect_deadline: Option<Instant>,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    user_disconnected: bool,
    has_connected: bool,
}

impl ConnectionStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Box<dyn Transport>,
        events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
        state_tx: watch::Sender<ConnectionState>,
        options: ConnectionOptions,
        timeouts: DocLinkTimeouts,
        handlers: EventHandlers,
        sdk_instance_id: String,
        sdk_name: String,
    ) -> Self {
        let ttl = (options.queue_ttl_ms > 0).then(|| Duration::from_millis(options.queue_ttl_ms));
        Self {
            state: ConnectionState::Initial,
            state_tx,
            transport,
            transport_open: false,
            epoch: 0,
            events_tx,
            queue: OfflineQueue::new(options.offline_queue_capacity, options.queue_policy, ttl),
            backoff: ReconnectBackoff::from_options(&options),
            options,
            timeouts,
            handlers,
            tracker: RequestTracker::new(),
            timed_out_subscribes: HashSet::new(),
            registry: SubscriptionRegistry::new(),
            router: NotificationRouter::new(sdk_instance_id.clone()),
            sdk_instance_id,
            sdk_name,
            reconnect_at: None,
            connect_deadline: None,
            connect_waiters: Vec::new(),
            user_disconnected: false,
            has_connected: false,
        }
    }

    /// Earliest instant at which [`on_tick`](Self::on_tick) has work to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        [
            self.connect_deadline,
            self.reconnect_at,
            self.tracker.next_deadline(),
            self.queue.next_expiry(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ── Commands ────────────────────────────────────────────────────────────

    pub fn handle_command(&mut self, cmd: SessionCmd) {
        match cmd {
            SessionCmd::Connect { reply } => self.connect(reply),
            SessionCmd::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            },
            SessionCmd::Close { reply } => {
                self.close();
                let _ = reply.send(());
            },
            SessionCmd::Query {
                request,
                options,
                reply,
            } => self.query(request, options, reply.into()),
            SessionCmd::Subscribe {
                key,
                volatile,
                registration,
                reply,
            } => self.subscribe(key, volatile, registration, reply),
            SessionCmd::Unsubscribe {
                room_id,
                callback_id,
                reply,
            } => self.unsubscribe(&room_id, callback_id, reply),
            SessionCmd::ListRooms { reply } => {
                let _ = reply.send(self.registry.snapshot());
            },
            SessionCmd::QueueLen { reply } => {
                let _ = reply.send(self.queue.len());
            },
            SessionCmd::ClearQueue { reply } => {
                let dropped = self.clear_queue();
                let _ = reply.send(dropped);
            },
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<Result<()>>) {
        match self.state {
            ConnectionState::Connected => {
                let _ = reply.send(Ok(()));
            },
            ConnectionState::Closed => {
                let _ = reply.send(Err(DocLinkError::Closed));
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.user_disconnected = false;
                self.connect_waiters.push(reply);
            },
            ConnectionState::Initial | ConnectionState::Error => {
                self.user_disconnected = false;
                self.backoff.reset();
                self.connect_waiters.push(reply);
                self.transition(ConnectionState::Connecting);
                self.begin_attempt();
            },
            ConnectionState::Offline => {
                self.user_disconnected = false;
                self.backoff.reset();
                self.connect_waiters.push(reply);
                self.start_reconnect_attempt();
            },
        }
    }

    fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Initial | ConnectionState::Error | ConnectionState::Closed => {},
            ConnectionState::Offline => {
                self.user_disconnected = true;
                self.reconnect_at = None;
            },
            ConnectionState::Connected => {
                self.user_disconnected = true;
                self.connection_lost(DisconnectReason::with_code("Client disconnected", 1000));
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.user_disconnected = true;
                self.close_transport();
                self.connect_deadline = None;
                self.reconnect_at = None;
                self.transition(ConnectionState::Offline);
            },
        }
        self.resolve_connect_waiters(Err(DocLinkError::NotConnected(
            "Disconnected by client".to_string(),
        )));
    }

    /// Terminal shutdown: every pending request, queued request and room
    /// waiter receives [`DocLinkError::Closed`].
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        let was_connected = self.state == ConnectionState::Connected;
        self.close_transport();
        self.connect_deadline = None;
        self.reconnect_at = None;

        for pending in self.tracker.drain() {
            match pending.completion {
                Completion::Caller(Some(tx)) => {
                    let _ = tx.send(Err(DocLinkError::Closed));
                },
                Completion::Unsubscribe(Some(tx)) => {
                    let _ = tx.send(Err(DocLinkError::Closed));
                },
                Completion::Caller(None)
                | Completion::Unsubscribe(None)
                | Completion::Subscribe { .. } => {},
            }
        }
        for item in self.queue.clear() {
            item.fail(DocLinkError::Closed);
        }
        self.registry.clear(&DocLinkError::Closed);
        self.resolve_connect_waiters(Err(DocLinkError::Closed));

        if was_connected {
            self.handlers
                .emit_disconnect(DisconnectReason::with_code("Session closed", 1000));
        }
        self.transition(ConnectionState::Closed);
    }

    fn query(&mut self, mut request: Request, options: QueryOptions, reply: ReplyTo) {
        match self.state {
            ConnectionState::Closed => return reply.fail(DocLinkError::Closed),
            ConnectionState::Initial | ConnectionState::Error => {
                return reply.fail(DocLinkError::NotConnected(format!(
                    "Session is {}; call connect() first",
                    self.state
                )))
            },
            _ => {},
        }

        request.request_id = options.request_id.clone().unwrap_or_else(new_request_id);
        self.stamp(&mut request);
        let timeout = DocLinkTimeouts::as_deadline(
            options.timeout.unwrap_or(self.timeouts.request_timeout),
        );
        let ReplyTo { response, accepted } = reply;

        if self.state == ConnectionState::Connected {
            match self.dispatch(request, Completion::Caller(response), timeout) {
                Ok(()) => ReplyTo::accept(accepted),
                Err((err, Completion::Caller(response))) => ReplyTo { response, accepted }.fail(err),
                Err(_) => {},
            }
            return;
        }

        if !self.options.offline_queue || !options.queuable {
            return ReplyTo { response, accepted }.fail(DocLinkError::NotConnected(format!(
                "Session is {}; request was not queued",
                self.state
            )));
        }

        let item = QueuedItem {
            request,
            reply: response,
            timeout,
        };
        match self.queue.enqueue(item, Instant::now()) {
            Ok(evicted) => {
                ReplyTo::accept(accepted);
                if let Some(evicted) = evicted {
                    let id = evicted.request.request_id.clone();
                    log::debug!("[doclink] Evicted queued request {}", id);
                    evicted.fail(DocLinkError::QueueDiscarded(format!(
                        "Request {} evicted by a newer request",
                        id
                    )));
                }
            },
            Err(rejected) => {
                let capacity = self.queue.capacity();
                ReplyTo {
                    response: rejected.reply,
                    accepted,
                }
                .fail(DocLinkError::QueueCapacity { capacity });
            },
        }
    }

    fn subscribe(
        &mut self,
        key: RoomKey,
        volatile: Map<String, JsonValue>,
        registration: Registration,
        reply: SubscribeWaiter,
    ) {
        let refusal = match self.state {
            ConnectionState::Closed => Some(DocLinkError::Closed),
            ConnectionState::Initial | ConnectionState::Error => Some(DocLinkError::NotConnected(
                format!("Session is {}; call connect() first", self.state),
            )),
            ConnectionState::Connected => None,
            _ if !self.options.offline_queue => Some(DocLinkError::NotConnected(format!(
                "Session is {} and the offline queue is disabled",
                self.state
            ))),
            _ => None,
        };
        if let Some(err) = refusal {
            let _ = reply.send(Err(err));
            return;
        }

        let room_id = match self.registry.subscribe(key, volatile, registration, reply) {
            SubscribeOutcome::Joined { .. } => return,
            SubscribeOutcome::Pending { room_id, .. }
            | SubscribeOutcome::NeedsSubscribe { room_id, .. } => room_id,
        };
        let idle = self
            .registry
            .get(&room_id)
            .map_or(false, |room| room.outstanding.is_none());
        if self.state == ConnectionState::Connected && idle {
            self.send_subscribe(&room_id);
        }
    }

    fn unsubscribe(
        &mut self,
        room_id: &str,
        callback_id: u64,
        reply: Option<oneshot::Sender<Result<()>>>,
    ) {
        match self.registry.unsubscribe(room_id, callback_id) {
            UnsubscribeOutcome::NeedsUnsubscribe { backend_room_id } => {
                self.send_unsubscribe(backend_room_id, reply)
            },
            outcome => {
                log::debug!(
                    "[doclink] Unsubscribe of callback {} from room {}: {:?}",
                    callback_id,
                    room_id,
                    outcome
                );
                if let Some(tx) = reply {
                    let _ = tx.send(Ok(()));
                }
            },
        }
    }

    fn clear_queue(&mut self) -> usize {
        let items = self.queue.clear();
        let dropped = items.len();
        for item in items {
            item.fail(DocLinkError::QueueDiscarded(
                "Offline queue cleared".to_string(),
            ));
        }
        dropped
    }

    // ── Transport events ────────────────────────────────────────────────────

    pub fn on_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        if epoch != self.epoch || !self.transport_open {
            log::debug!(
                "[doclink] Ignoring stale transport event from epoch {} (current {})",
                epoch,
                self.epoch
            );
            return;
        }

        match event {
            TransportEvent::Open => match self.state {
                ConnectionState::Connecting | ConnectionState::Reconnecting => self.enter_connected(),
                state => log::debug!("[doclink] Unexpected transport open in state {}", state),
            },
            TransportEvent::Message(frame) => self.on_frame(&frame),
            TransportEvent::Close(reason) => self.transport_down(reason, None),
            TransportEvent::Error(message) => {
                self.transport_down(DisconnectReason::new(message.clone()), Some(message))
            },
        }
    }

    fn transport_down(&mut self, reason: DisconnectReason, error: Option<String>) {
        match self.state {
            ConnectionState::Connected => {
                if let Some(message) = error {
                    self.handlers
                        .emit_error(ConnectionError::new(message, self.options.auto_reconnect));
                }
                self.connection_lost(reason);
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.attempt_failed(DocLinkError::TransportError(reason.message))
            },
            _ => {},
        }
    }

    fn on_frame(&mut self, frame: &[u8]) {
        self.handlers.emit_receive(frame);
        let registry = &self.registry;
        match parse_frame(frame, |channel| registry.has_channel(channel)) {
            Ok(Some(Inbound::Response(response))) => self.on_response(response),
            Ok(Some(Inbound::Notification(notification))) => {
                self.router.dispatch(&mut self.registry, &notification);
            },
            Ok(None) => log::debug!("[doclink] Ignoring frame that is neither response nor notification"),
            Err(e) => log::warn!("[doclink] {}", e),
        }
    }

    fn on_response(&mut self, response: Response) {
        let Some(pending) = self.tracker.resolve(&response.request_id) else {
            if self.timed_out_subscribes.remove(&response.request_id) {
                return self.on_late_subscribe_ack(response);
            }
            log::debug!(
                "[doclink] Ignoring late or unsolicited response {}",
                response.request_id
            );
            return;
        };

        match pending.completion {
            Completion::Caller(Some(tx)) => {
                if tx.send(response.into_result()).is_err() {
                    log::debug!("[doclink] Caller of {} went away", pending.request_id);
                }
            },
            Completion::Caller(None) => {
                if let Some(message) = response.error_message() {
                    log::debug!(
                        "[doclink] Fire-and-forget request {} failed: {}",
                        pending.request_id,
                        message
                    );
                }
            },
            Completion::Subscribe { room_id } => {
                self.on_subscribe_response(&room_id, &pending.request_id, response)
            },
            Completion::Unsubscribe(reply) => {
                let result = match response.error_message() {
                    Some(message) => Err(DocLinkError::SubscriptionError(message)),
                    None => Ok(()),
                };
                if let Some(tx) = reply {
                    let _ = tx.send(result);
                }
            },
        }
    }

    fn on_subscribe_response(&mut self, room_id: &str, request_id: &str, response: Response) {
        if let Some(message) = response.error_message() {
            return self.subscribe_failed(room_id, request_id, DocLinkError::SubscriptionError(message));
        }

        let backend_room_id = response.result.get("roomId").and_then(JsonValue::as_str);
        let channel = response.result.get("channel").and_then(JsonValue::as_str);
        let (Some(backend_room_id), Some(channel)) = (backend_room_id, channel) else {
            return self.subscribe_failed(
                room_id,
                request_id,
                DocLinkError::SubscriptionError(
                    "Subscribe acknowledgment lacks roomId or channel".to_string(),
                ),
            );
        };

        match self.registry.on_subscribed(
            room_id,
            request_id,
            backend_room_id.to_string(),
            channel.to_string(),
        ) {
            AckOutcome::Stale => {
                log::debug!("[doclink] Ignoring stale subscribe ack for room {}", room_id)
            },
            AckOutcome::Active { replayed } => {
                log::info!("[doclink] Room {} active on channel {}", room_id, channel);
                if replayed {
                    self.router.notify_resubscribed(&self.registry, room_id);
                }
            },
            AckOutcome::NeedsUnsubscribe { backend_room_id } => {
                log::debug!("[doclink] Room {} abandoned before its ack", room_id);
                self.send_unsubscribe(backend_room_id, None);
            },
        }
    }

    /// The backend acknowledged a subscribe we already gave up on.
    fn on_late_subscribe_ack(&mut self, response: Response) {
        if response.error_message().is_some() {
            return;
        }
        let Some(backend_room_id) = response.result.get("roomId").and_then(JsonValue::as_str) else {
            return;
        };
        log::debug!(
            "[doclink] Late ack for timed-out subscribe {}; unsubscribing {}",
            response.request_id,
            backend_room_id
        );
        self.send_unsubscribe(backend_room_id.to_string(), None);
    }

    fn subscribe_failed(&mut self, room_id: &str, request_id: &str, err: DocLinkError) {
        let Some(failed) = self.registry.on_subscribe_failed(room_id, request_id, &err) else {
            return;
        };
        log::warn!(
            "[doclink] Subscribe to '{}' (room {}) failed: {}",
            failed.collection,
            failed.room_id,
            err
        );
        if failed.was_replay {
            self.handlers.emit_error(ConnectionError::new(
                format!(
                    "Failed to re-subscribe room {} on '{}': {}",
                    failed.room_id, failed.collection, err
                ),
                true,
            ));
        }
    }

    // ── Timers ──────────────────────────────────────────────────────────────

    pub fn on_tick(&mut self, now: Instant) {
        if self.connect_deadline.map_or(false, |at| at <= now) {
            self.connect_deadline = None;
            if matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Reconnecting
            ) {
                self.attempt_failed(DocLinkError::Timeout(format!(
                    "Connection timeout ({:?})",
                    self.timeouts.connection_timeout
                )));
            }
        }

        if self.reconnect_at.map_or(false, |at| at <= now) {
            self.start_reconnect_attempt();
        }

        for pending in self.tracker.expire(now) {
            let waited = pending
                .timeout_at
                .map(|at| at.saturating_duration_since(pending.issued_at))
                .unwrap_or_default();
            let err = DocLinkError::Timeout(format!(
                "Request {} timed out after {:?}",
                pending.request_id, waited
            ));
            match pending.completion {
                Completion::Caller(Some(tx)) => {
                    let _ = tx.send(Err(err));
                },
                Completion::Caller(None) => log::debug!("[doclink] {}", err),
                Completion::Subscribe { room_id } => {
                    self.timed_out_subscribes.insert(pending.request_id.clone());
                    self.subscribe_failed(&room_id, &pending.request_id, err)
                },
                Completion::Unsubscribe(reply) => {
                    if let Some(tx) = reply {
                        let _ = tx.send(Err(err));
                    }
                },
            }
        }

        for item in self.queue.expire(now) {
            let id = item.request.request_id.clone();
            item.fail(DocLinkError::QueueExpired(format!(
                "Request {} waited longer than {}ms",
                id, self.options.queue_ttl_ms
            )));
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if !from.can_transition_to(to) {
            log::warn!("[doclink] Refusing invalid transition {} -> {}", from, to);
            return;
        }
        self.state = to;
        log::info!("[doclink] Connection state {} -> {}", from, to);
        self.state_tx.send_replace(to);
        self.handlers.emit_state_change(from, to);
    }

    fn open_transport(&mut self) {
        self.epoch += 1;
        self.transport_open = true;
        let events = TransportEventSender::new(self.epoch, self.events_tx.clone());
        self.transport.open(events);
    }

    fn close_transport(&mut self) {
        if self.transport_open {
            self.transport.close();
            self.transport_open = false;
        }
        self.epoch += 1;
        // The backend drops every subscription of a closed connection.
        self.timed_out_subscribes.clear();
    }

    fn begin_attempt(&mut self) {
        self.connect_deadline = DocLinkTimeouts::as_deadline(self.timeouts.connection_timeout)
            .map(|d| Instant::now() + d);
        self.open_transport();
    }

    fn start_reconnect_attempt(&mut self) {
        self.reconnect_at = None;
        if self.state == ConnectionState::Offline {
            self.transition(ConnectionState::Reconnecting);
        }
        if self.backoff.is_exhausted() {
            let max = self.options.max_reconnect_attempts.unwrap_or_default();
            log::warn!("[doclink] Max reconnection attempts ({}) reached", max);
            return self.enter_error(DocLinkError::NotConnected(format!(
                "Max reconnection attempts ({}) reached",
                max
            )));
        }
        self.backoff.record_attempt();
        log::info!("[doclink] Reconnection attempt {}", self.backoff.attempts());
        self.begin_attempt();
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.backoff.next_delay();
        log::info!(
            "[doclink] Attempting reconnection in {:?} (attempt {})",
            delay,
            self.backoff.attempts() + 1
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn attempt_failed(&mut self, err: DocLinkError) {
        self.close_transport();
        self.connect_deadline = None;

        match self.state {
            ConnectionState::Connecting => self.enter_error(err),
            ConnectionState::Reconnecting => {
                log::warn!(
                    "[doclink] Reconnection attempt {} failed: {}",
                    self.backoff.attempts(),
                    err
                );
                if !self.options.auto_reconnect || self.backoff.is_exhausted() {
                    return self.enter_error(err);
                }
                self.handlers
                    .emit_error(ConnectionError::new(err.to_string(), true));
                self.schedule_reconnect();
            },
            _ => {},
        }
    }

    fn enter_connected(&mut self) {
        self.connect_deadline = None;
        self.reconnect_at = None;
        self.backoff.reset();

        let now = Instant::now();
        if !self.queue.is_empty() {
            log::info!(
                "[doclink] Flushing {} queued request(s), oldest waited {:?}",
                self.queue.len(),
                self.queue.oldest_age(now).unwrap_or_default()
            );
        }
        let (ready, expired) = self.queue.take_all(now);
        for item in expired {
            let id = item.request.request_id.clone();
            item.fail(DocLinkError::QueueExpired(format!(
                "Request {} waited longer than {}ms",
                id, self.options.queue_ttl_ms
            )));
        }
        for item in ready {
            if let Err((err, Completion::Caller(reply))) =
                self.dispatch(item.request, Completion::Caller(item.reply), item.timeout)
            {
                if let Some(tx) = reply {
                    let _ = tx.send(Err(err));
                }
            }
        }

        let replay = self.registry.rooms_to_replay();
        if !replay.is_empty() {
            log::info!("[doclink] Re-subscribing {} room(s)", replay.len());
        }
        for room_id in replay {
            self.send_subscribe(&room_id);
        }

        let reconnected = self.has_connected;
        self.has_connected = true;
        self.transition(ConnectionState::Connected);
        self.resolve_connect_waiters(Ok(()));
        if reconnected {
            self.handlers.emit_reconnect();
        } else {
            self.handlers.emit_connect();
        }
    }

    /// An established connection went away.
    fn connection_lost(&mut self, reason: DisconnectReason) {
        log::warn!(
            "[doclink] Connection lost: {} ({} request(s) in flight)",
            reason,
            self.tracker.len()
        );
        self.close_transport();

        for pending in self.tracker.drain() {
            match pending.completion {
                Completion::Caller(Some(tx)) => {
                    let _ = tx.send(Err(DocLinkError::NotConnected(format!(
                        "Connection lost before the response to {}",
                        pending.request_id
                    ))));
                },
                Completion::Unsubscribe(Some(tx)) => {
                    let _ = tx.send(Ok(()));
                },
                Completion::Caller(None)
                | Completion::Unsubscribe(None)
                | Completion::Subscribe { .. } => {},
            }
        }
        self.registry.connection_lost();
        self.handlers.emit_disconnect(reason);
        self.transition(ConnectionState::Offline);

        if self.options.auto_reconnect && !self.user_disconnected {
            self.schedule_reconnect();
        } else {
            log::info!("[doclink] Staying offline until connect() is called");
        }
    }

    fn enter_error(&mut self, err: DocLinkError) {
        self.close_transport();
        self.connect_deadline = None;
        self.reconnect_at = None;

        let not_connected = DocLinkError::NotConnected(err.to_string());
        for pending in self.tracker.drain() {
            match pending.completion {
                Completion::Caller(Some(tx)) => {
                    let _ = tx.send(Err(not_connected.clone()));
                },
                Completion::Unsubscribe(Some(tx)) => {
                    let _ = tx.send(Ok(()));
                },
                Completion::Caller(None)
                | Completion::Unsubscribe(None)
                | Completion::Subscribe { .. } => {},
            }
        }
        for item in self.queue.clear() {
            item.fail(not_connected.clone());
        }
        self.registry.fail_unacknowledged(&not_connected);

        self.handlers
            .emit_error(ConnectionError::new(err.to_string(), false));
        self.transition(ConnectionState::Error);
        self.resolve_connect_waiters(Err(err));
    }

    fn resolve_connect_waiters(&mut self, result: Result<()>) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────────

    fn stamp(&self, request: &mut Request) {
        request
            .volatile
            .insert("sdkInstanceId".to_string(), json!(self.sdk_instance_id));
        request
            .volatile
            .entry("sdkName".to_string())
            .or_insert_with(|| json!(self.sdk_name));
    }

    /// Write `request` to the transport and track it.
    fn dispatch(
        &mut self,
        request: Request,
        completion: Completion,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), (DocLinkError, Completion)> {
        let handlers = &self.handlers;
        let transport = &mut self.transport;
        self.tracker
            .send(&request, completion, timeout, Instant::now(), |frame| {
                handlers.emit_send(&frame);
                transport.send(frame)
            })
    }

    fn subscribe_request(&self, room: &Room) -> Request {
        let mut request = Request::new("realtime", "subscribe")
            .with_collection(room.key.collection.clone())
            .with_body(room.key.filters.clone())
            .with_arg("scope", json!(room.key.scope))
            .with_arg("users", json!(room.key.users));
        request.volatile = room.volatile.clone();
        request.request_id = new_request_id();
        self.stamp(&mut request);
        request
    }

    fn send_subscribe(&mut self, room_id: &str) {
        let Some(room) = self.registry.get(room_id) else {
            return;
        };
        let request = self.subscribe_request(room);
        let request_id = request.request_id.clone();
        let timeout = DocLinkTimeouts::as_deadline(self.timeouts.subscribe_timeout);

        let completion = Completion::Subscribe {
            room_id: room_id.to_string(),
        };
        match self.dispatch(request, completion, timeout) {
            Ok(()) => self.registry.mark_sent(room_id, &request_id),
            Err((err, _)) => {
                log::warn!("[doclink] Failed to send subscribe for room {}: {}", room_id, err);
                self.registry.fail_unsent(room_id, &err);
            },
        }
    }

    fn send_unsubscribe(
        &mut self,
        backend_room_id: String,
        reply: Option<oneshot::Sender<Result<()>>>,
    ) {
        if self.state != ConnectionState::Connected {
            if let Some(tx) = reply {
                let _ = tx.send(Ok(()));
            }
            return;
        }

        let mut request =
            Request::new("realtime", "unsubscribe").with_body(json!({ "roomId": backend_room_id }));
        request.request_id = new_request_id();
        self.stamp(&mut request);
        let timeout = DocLinkTimeouts::as_deadline(self.timeouts.request_timeout);

        if let Err((err, Completion::Unsubscribe(Some(tx)))) =
            self.dispatch(request, Completion::Unsubscribe(reply), timeout)
        {
            let _ = tx.send(Err(err));
        }
    }
}
