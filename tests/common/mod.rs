#![allow(dead_code)]

use bytes::Bytes;
use doclink::{
    ConnectionOptions, ConnectionState, DisconnectReason, DocLinkClient, DocLinkError, DocLinkTimeouts,
    EventHandlers, Transport, TransportEventSender,
};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

/// Route `log` output to the test harness (`RUST_LOG=doclink=debug`).
pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Default)]
struct Shared {
    events: Option<TransportEventSender>,
    opens: usize,
    closes: usize,
    sent: Vec<JsonValue>,
    auto_accept: bool,
    refuse: bool,
    fail_sends: bool,
}

/// In-memory transport. Every frame written by the session is recorded and
/// the test drives the connection through the paired [`MockHandle`].
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

impl Transport for MockTransport {
    fn open(&mut self, events: TransportEventSender) {
        let mut shared = self.shared.lock().unwrap();
        shared.opens += 1;
        if shared.refuse {
            events.closed(DisconnectReason::new("connection refused"));
        } else if shared.auto_accept {
            events.opened();
        }
        shared.events = Some(events);
    }

    fn send(&mut self, frame: Bytes) -> doclink::Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_sends {
            return Err(DocLinkError::TransportError("socket write failed".into()));
        }
        shared.sent.push(serde_json::from_slice(&frame).unwrap());
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        shared.closes += 1;
        shared.events = None;
    }
}

#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

pub fn mock_transport() -> (MockTransport, MockHandle) {
    let shared = Arc::new(Mutex::new(Shared {
        auto_accept: true,
        ..Shared::default()
    }));
    (
        MockTransport {
            shared: shared.clone(),
        },
        MockHandle { shared },
    )
}

impl MockHandle {
    /// Open connections as soon as they are requested (the default).
    pub fn set_auto_accept(&self, enabled: bool) {
        self.shared.lock().unwrap().auto_accept = enabled;
    }

    /// Fail every connection attempt immediately.
    pub fn set_refuse(&self, enabled: bool) {
        self.shared.lock().unwrap().refuse = enabled;
    }

    pub fn set_fail_sends(&self, enabled: bool) {
        self.shared.lock().unwrap().fail_sends = enabled;
    }

    pub fn opens(&self) -> usize {
        self.shared.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().unwrap().closes
    }

    pub fn sent(&self) -> Vec<JsonValue> {
        self.shared.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.shared.lock().unwrap().sent.len()
    }

    /// Frames for `controller`/`action`, in send order.
    pub fn sent_for(&self, controller: &str, action: &str) -> Vec<JsonValue> {
        self.sent()
            .into_iter()
            .filter(|f| f["controller"] == controller && f["action"] == action)
            .collect()
    }

    fn events(&self) -> Option<TransportEventSender> {
        self.shared.lock().unwrap().events.clone()
    }

    /// Complete a pending connection attempt.
    pub fn accept(&self) {
        self.events().expect("no open connection attempt").opened();
    }

    /// Fail a pending connection attempt.
    pub fn refuse(&self) {
        self.events()
            .expect("no open connection attempt")
            .closed(DisconnectReason::new("connection refused"));
    }

    /// Simulate a network drop of the current connection.
    pub fn drop_connection(&self) {
        let events = self.shared.lock().unwrap().events.take();
        events
            .expect("no open connection")
            .closed(DisconnectReason::with_code("network down", 1006));
    }

    pub fn push_frame(&self, frame: JsonValue) {
        self.events()
            .expect("no open connection")
            .message(serde_json::to_vec(&frame).unwrap());
    }

    pub fn respond(&self, request_id: &str, result: JsonValue) {
        self.push_frame(json!({"requestId": request_id, "status": 200, "result": result}));
    }

    pub fn respond_error(&self, request_id: &str, status: u16, message: &str) {
        self.push_frame(json!({
            "requestId": request_id,
            "status": status,
            "error": {"message": message, "status": status},
        }));
    }

    /// Acknowledge the subscribe frame `frame` with the given backend ids.
    pub fn ack_subscribe(&self, frame: &JsonValue, backend_room_id: &str, channel: &str) {
        let request_id = frame["requestId"].as_str().unwrap();
        self.respond(request_id, json!({"roomId": backend_room_id, "channel": channel}));
    }

    pub fn notify(&self, channel: &str, action: &str, document: JsonValue) {
        self.push_frame(json!({
            "room": channel,
            "type": "document",
            "controller": "document",
            "action": action,
            "collection": "messages",
            "result": document,
        }));
    }

    pub fn notify_from(&self, channel: &str, sdk_instance_id: &str, document: JsonValue) {
        self.push_frame(json!({
            "room": channel,
            "type": "document",
            "action": "create",
            "collection": "messages",
            "result": document,
            "volatile": {"sdkInstanceId": sdk_instance_id},
        }));
    }

    /// Wait until at least `n` frames were written, returning all of them.
    pub async fn wait_for_sent(&self, n: usize) -> Vec<JsonValue> {
        for _ in 0..10_000 {
            if self.sent_count() >= n {
                return self.sent();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {} frames, got {:?}", n, self.sent());
    }

    /// Wait for the `nth` (0-based) frame for `controller`/`action`.
    pub async fn wait_for_request(&self, controller: &str, action: &str, nth: usize) -> JsonValue {
        for _ in 0..10_000 {
            if let Some(frame) = self.sent_for(controller, action).into_iter().nth(nth) {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("no {}:{} frame #{} in {:?}", controller, action, nth, self.sent());
    }

    pub async fn wait_for_opens(&self, n: usize) {
        for _ in 0..100_000 {
            if self.opens() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {} connection attempts, got {}", n, self.opens());
    }
}

/// Let the session task process everything already sent to it.
pub async fn settle() {
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn options() -> ConnectionOptions {
    ConnectionOptions::new()
        .with_reconnect_delay_ms(100)
        .with_max_reconnect_delay_ms(1_000)
        .with_reconnect_jitter(0.0)
        .with_queue_ttl_ms(0)
}

pub fn client_with(
    options: ConnectionOptions,
    handlers: EventHandlers,
) -> (DocLinkClient, MockHandle) {
    init();
    let (transport, handle) = mock_transport();
    let client = DocLinkClient::builder()
        .transport(transport)
        .connection_options(options)
        .timeouts(DocLinkTimeouts::for_testing(10))
        .event_handlers(handlers)
        .build()
        .unwrap();
    (client, handle)
}

/// A client already connected over a fresh mock transport.
pub async fn connected_client(options: ConnectionOptions) -> (DocLinkClient, MockHandle) {
    let (client, mock) = client_with(options, EventHandlers::new());
    client.connect().await.unwrap();
    (client, mock)
}

/// Wait (on virtual time) until the session reports `state`.
pub async fn wait_for_state(client: &DocLinkClient, state: ConnectionState) {
    let mut rx = client.state_changes();
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", state))
        .expect("session task exited");
}

/// Handlers recording every state the session enters.
pub fn recording_states() -> (EventHandlers, Arc<Mutex<Vec<ConnectionState>>>) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    let handlers = EventHandlers::new().on_state_change(move |_, to| sink.lock().unwrap().push(to));
    (handlers, states)
}
