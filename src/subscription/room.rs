//! Room identity and per-room bookkeeping.

use crate::error::DocLinkError;
use crate::models::{Notification, RoomInfo, RoomState, SubscribeScope, UserScope};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Callback invoked for every notification delivered to a room.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Acknowledgment handed to a subscriber once its room is ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubscribeAck {
    pub room_id: String,
    pub callback_id: u64,
    pub channel: String,
}

pub(crate) type SubscribeWaiter = oneshot::Sender<Result<SubscribeAck, DocLinkError>>;

/// Serialize `value` with object keys sorted at every depth.
///
/// Arrays keep their order. Two filter documents that differ only in key
/// order produce the same string.
pub(crate) fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        },
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Parameters that define a room's identity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RoomKey {
    pub collection: String,
    pub filters: JsonValue,
    pub subscribe_to_self: bool,
    pub scope: SubscribeScope,
    pub users: UserScope,
}

impl RoomKey {
    /// Deterministic room id: hex SHA-256 over the canonical encoding.
    pub fn room_id(&self) -> String {
        let identity = serde_json::json!({
            "collection": self.collection,
            "filters": self.filters,
            "scope": self.scope,
            "selfNotify": self.subscribe_to_self,
            "users": self.users,
        });
        hex::encode(Sha256::digest(canonical_json(&identity).as_bytes()))
    }
}

pub(crate) struct Registration {
    pub handler: NotificationHandler,
    pub notify_resubscribed: bool,
}

pub(crate) struct Room {
    pub room_id: String,
    pub key: RoomKey,
    pub volatile: Map<String, JsonValue>,
    pub state: RoomState,
    /// Backend routing channel, set on acknowledgment
    pub channel: Option<String>,
    /// Backend room id, required to unsubscribe
    pub backend_room_id: Option<String>,
    /// Handlers in registration order
    pub handlers: BTreeMap<u64, Registration>,
    /// Request id of the subscribe call currently in flight
    pub outstanding: Option<String>,
    /// Subscribers waiting for the acknowledgment
    pub waiters: Vec<(u64, SubscribeWaiter)>,
    pub created_at_ms: u64,
    pub last_notification_ms: Option<u64>,
    pub(crate) order: u64,
}

impl Room {
    pub fn new(room_id: String, key: RoomKey, volatile: Map<String, JsonValue>, order: u64) -> Self {
        Self {
            room_id,
            key,
            volatile,
            state: RoomState::Subscribing,
            channel: None,
            backend_room_id: None,
            handlers: BTreeMap::new(),
            outstanding: None,
            waiters: Vec::new(),
            created_at_ms: crate::now_ms(),
            last_notification_ms: None,
            order,
        }
    }

    pub fn fail_waiters(&mut self, err: &DocLinkError) {
        for (_, waiter) in self.waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            collection: self.key.collection.clone(),
            filters: self.key.filters.clone(),
            subscribe_to_self: self.key.subscribe_to_self,
            state: self.state,
            channel: self.channel.clone(),
            handler_count: self.handlers.len(),
            subscribe_in_flight: self.outstanding.is_some(),
            created_at_ms: self.created_at_ms,
            last_notification_ms: self.last_notification_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(filters: JsonValue) -> RoomKey {
        RoomKey {
            collection: "messages".into(),
            filters,
            subscribe_to_self: true,
            scope: SubscribeScope::All,
            users: UserScope::None,
        }
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"y": [3, {"q": 1, "p": 2}], "x": null}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"x":null,"y":[3,{"p":2,"q":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_room_id_ignores_key_order() {
        let a: JsonValue =
            serde_json::from_str(r#"{"equals":{"room":"lobby"},"range":{"age":{"gte":18,"lt":65}}}"#)
                .unwrap();
        let b: JsonValue =
            serde_json::from_str(r#"{"range":{"age":{"lt":65,"gte":18}},"equals":{"room":"lobby"}}"#)
                .unwrap();
        assert_eq!(key(a).room_id(), key(b).room_id());
    }

    #[test]
    fn test_room_id_depends_on_every_identity_field() {
        let base = key(json!({"equals": {"room": "lobby"}}));
        let id = base.room_id();
        assert_eq!(id.len(), 64);

        let mut other = base.clone();
        other.filters = json!({"equals": {"room": "attic"}});
        assert_ne!(other.room_id(), id);

        let mut other = base.clone();
        other.subscribe_to_self = false;
        assert_ne!(other.room_id(), id);

        let mut other = base.clone();
        other.collection = "users".into();
        assert_ne!(other.room_id(), id);

        let mut other = base.clone();
        other.scope = SubscribeScope::In;
        assert_ne!(other.room_id(), id);

        let mut other = base;
        other.users = UserScope::All;
        assert_ne!(other.room_id(), id);
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(
            key(json!({"in": {"tag": ["a", "b"]}})).room_id(),
            key(json!({"in": {"tag": ["b", "a"]}})).room_id()
        );
    }
}
