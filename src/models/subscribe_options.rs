use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Which document scope changes a room is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeScope {
    /// Documents entering and leaving the filters
    #[default]
    All,
    /// Only documents entering the filters
    In,
    /// Only documents leaving the filters
    Out,
    /// No document notifications
    None,
}

/// Which user presence events a room is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserScope {
    All,
    In,
    Out,
    /// No user notifications
    #[default]
    None,
}

/// Options for a single room subscription.
///
/// # Example
///
/// ```rust
/// use doclink::{SubscribeOptions, SubscribeScope};
///
/// let options = SubscribeOptions::new()
///     .with_scope(SubscribeScope::In)
///     .with_subscribe_to_self(false)
///     .with_notify_resubscribed(true);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscribeOptions {
    /// Deliver notifications triggered by this client's own requests.
    /// `None` uses `ConnectionOptions::subscribe_to_self`.
    pub subscribe_to_self: Option<bool>,

    pub scope: SubscribeScope,

    pub users: UserScope,

    /// Volatile metadata sent with the subscribe request
    pub volatile: Map<String, JsonValue>,

    /// Deliver a `NotificationType::Resubscribed` notification to this
    /// handler every time the room is replayed after a reconnection.
    pub notify_resubscribed: bool,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribe_to_self(mut self, enabled: bool) -> Self {
        self.subscribe_to_self = Some(enabled);
        self
    }

    pub fn with_scope(mut self, scope: SubscribeScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_users(mut self, users: UserScope) -> Self {
        self.users = users;
        self
    }

    pub fn with_volatile(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.volatile.insert(key.into(), value);
        self
    }

    pub fn with_notify_resubscribed(mut self, enabled: bool) -> Self {
        self.notify_resubscribed = enabled;
        self
    }
}
