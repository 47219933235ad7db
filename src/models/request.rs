use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Request sent to the backend.
///
/// The session fills in `request_id` (unless the caller supplied one through
/// [`QueryOptions::request_id`](super::QueryOptions)) and stamps `volatile`
/// with the SDK instance id before the request reaches the transport.
///
/// # Examples
///
/// ```rust
/// use doclink::Request;
/// use serde_json::json;
///
/// let request = Request::new("document", "create")
///     .with_collection("messages")
///     .with_body(json!({ "text": "hello" }))
///     .with_arg("refresh", json!("wait_for"));
/// assert_eq!(request.controller, "document");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id; empty until the session assigns one.
    #[serde(rename = "requestId", default)]
    pub request_id: String,

    /// Backend controller (e.g. `document`, `realtime`)
    pub controller: String,

    /// Controller action (e.g. `create`, `subscribe`)
    pub action: String,

    /// Target collection, when the action is collection-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Request payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<JsonValue>,

    /// Volatile metadata forwarded to notifications caused by this request
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub volatile: Map<String, JsonValue>,

    /// Additional top-level arguments
    #[serde(flatten)]
    pub args: Map<String, JsonValue>,
}

impl Request {
    /// Create a request for `controller`/`action` with no payload.
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            controller: controller.into(),
            action: action.into(),
            collection: None,
            body: None,
            volatile: Map::new(),
            args: Map::new(),
        }
    }

    /// Set the target collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Set the request payload.
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a top-level argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Add a volatile metadata entry.
    pub fn with_volatile(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.volatile.insert(key.into(), value);
        self
    }

    /// Serialize into a transport frame.
    pub(crate) fn to_frame(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let mut request = Request::new("document", "get")
            .with_collection("users")
            .with_arg("_id", json!("u1"));
        request.request_id = "r-1".into();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "requestId": "r-1",
                "controller": "document",
                "action": "get",
                "collection": "users",
                "_id": "u1"
            })
        );
    }

    #[test]
    fn test_volatile_and_body_present_when_set() {
        let request = Request::new("realtime", "publish")
            .with_body(json!({"a": 1}))
            .with_volatile("origin", json!("test"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["body"], json!({"a": 1}));
        assert_eq!(value["volatile"]["origin"], json!("test"));
    }
}
