use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Kind of real-time notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A document entered, changed in, or left the room's scope
    Document,
    /// A user joined or left the room
    User,
    /// Synthetic event raised after a room replay, for handlers that asked for it
    Resubscribed,
    /// Any type this client does not know about
    #[serde(other)]
    Other,
}

/// Real-time notification delivered to room handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Backend channel the notification was published on
    #[serde(rename = "room")]
    pub channel: String,

    #[serde(rename = "type")]
    pub kind: NotificationType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Notification content (document, user info, ...)
    #[serde(default)]
    pub result: JsonValue,

    /// Volatile metadata of the request that caused the notification
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub volatile: Map<String, JsonValue>,

    /// `in` / `out` for document scope changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Millis since Unix epoch, as stamped by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Notification {
    /// Instance id of the SDK whose request triggered this notification.
    pub fn sdk_instance_id(&self) -> Option<&str> {
        self.volatile.get("sdkInstanceId").and_then(JsonValue::as_str)
    }

    /// Build the synthetic notification sent after a room replay.
    pub(crate) fn resubscribed(channel: &str, collection: &str) -> Self {
        Self {
            channel: channel.to_string(),
            kind: NotificationType::Resubscribed,
            controller: Some("realtime".to_string()),
            action: Some("subscribe".to_string()),
            collection: Some(collection.to_string()),
            result: JsonValue::Null,
            volatile: Map::new(),
            scope: None,
            timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_document_notification() {
        let notification: Notification = serde_json::from_value(json!({
            "room": "chan-1",
            "type": "document",
            "action": "create",
            "collection": "messages",
            "scope": "in",
            "result": {"_id": "m1"},
            "volatile": {"sdkInstanceId": "abc"}
        }))
        .unwrap();
        assert_eq!(notification.channel, "chan-1");
        assert_eq!(notification.kind, NotificationType::Document);
        assert_eq!(notification.sdk_instance_id(), Some("abc"));
    }

    #[test]
    fn test_unknown_type_is_other() {
        let notification: Notification =
            serde_json::from_value(json!({"room": "c", "type": "TokenExpired"})).unwrap();
        assert_eq!(notification.kind, NotificationType::Other);
        assert!(notification.sdk_instance_id().is_none());
    }
}
