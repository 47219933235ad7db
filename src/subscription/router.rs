//! Delivery of inbound notifications to room handlers.

use super::registry::SubscriptionRegistry;
use super::room::NotificationHandler;
use crate::models::{Notification, RoomState};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Routes notifications by channel to the handlers of ACTIVE rooms.
///
/// Notifications for rooms that are still (re)subscribing are dropped: the
/// backend channel may change on acknowledgment, and handlers only see events
/// for a subscription the backend has confirmed.
pub(crate) struct NotificationRouter {
    sdk_instance_id: String,
}

impl NotificationRouter {
    pub fn new(sdk_instance_id: impl Into<String>) -> Self {
        Self {
            sdk_instance_id: sdk_instance_id.into(),
        }
    }

    /// Deliver `notification`. Returns the number of handlers invoked.
    pub fn dispatch(&self, registry: &mut SubscriptionRegistry, notification: &Notification) -> usize {
        let Some(room) = registry.room_for_channel_mut(&notification.channel) else {
            log::debug!(
                "[doclink] Dropping notification for unknown channel {}",
                notification.channel
            );
            return 0;
        };

        if room.state != RoomState::Active {
            log::debug!(
                "[doclink] Dropping notification for room {} in state {}",
                room.room_id,
                room.state
            );
            return 0;
        }

        if !room.key.subscribe_to_self
            && notification.sdk_instance_id() == Some(self.sdk_instance_id.as_str())
        {
            return 0;
        }

        room.last_notification_ms = Some(crate::now_ms());
        let handlers: Vec<NotificationHandler> =
            room.handlers.values().map(|r| r.handler.clone()).collect();
        let room_id = room.room_id.clone();
        invoke_all(&room_id, &handlers, notification)
    }

    /// Send the synthetic resubscribed notification to handlers that asked for it.
    pub fn notify_resubscribed(&self, registry: &SubscriptionRegistry, room_id: &str) -> usize {
        let Some(room) = registry.get(room_id) else {
            return 0;
        };
        let Some(channel) = room.channel.as_deref() else {
            return 0;
        };
        let handlers: Vec<NotificationHandler> = room
            .handlers
            .values()
            .filter(|r| r.notify_resubscribed)
            .map(|r| r.handler.clone())
            .collect();
        if handlers.is_empty() {
            return 0;
        }
        let notification = Notification::resubscribed(channel, &room.key.collection);
        invoke_all(room_id, &handlers, &notification)
    }
}

fn invoke_all(room_id: &str, handlers: &[NotificationHandler], notification: &Notification) -> usize {
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(notification))).is_err() {
            log::warn!("[doclink] Notification handler of room {} panicked", room_id);
        }
    }
    handlers.len()
}
