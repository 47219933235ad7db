//! Table of rooms known to the session.
//!
//! The registry never performs I/O. Each operation updates the table and
//! returns an outcome telling the session which network call, if any, has to
//! follow. This keeps the at-most-one-outstanding-subscribe rule in one place.

use super::room::{Registration, Room, RoomKey, SubscribeAck, SubscribeWaiter};
use crate::error::DocLinkError;
use crate::models::{RoomInfo, RoomState};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// What the session must do after [`SubscriptionRegistry::subscribe`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SubscribeOutcome {
    /// Joined an ACTIVE room; the waiter was already answered.
    Joined { room_id: String, callback_id: u64 },
    /// Joined a room whose acknowledgment is pending.
    Pending { room_id: String, callback_id: u64 },
    /// New room: a network subscribe must be issued (when connected).
    NeedsSubscribe { room_id: String, callback_id: u64 },
}

/// What the session must do after an acknowledgment.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    /// No matching outstanding subscribe; nothing to do.
    Stale,
    /// Room is ACTIVE. `replayed` is set when the ack ended a replay.
    Active { replayed: bool },
    /// Nobody wants the room any more; unsubscribe it on the backend.
    NeedsUnsubscribe { backend_room_id: String },
}

/// What the session must do after [`SubscriptionRegistry::unsubscribe`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UnsubscribeOutcome {
    /// Unknown room or callback.
    NotFound,
    /// Other handlers remain.
    Removed,
    /// Last handler left while a subscribe is in flight; the ack will clean up.
    Cancelled,
    /// Last handler left a room the backend never acknowledged.
    Discarded,
    /// Last handler left an acknowledged room.
    NeedsUnsubscribe { backend_room_id: String },
}

/// Room that was dropped after its subscribe failed.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FailedRoom {
    pub room_id: String,
    pub collection: String,
    pub was_replay: bool,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    rooms: HashMap<String, Room>,
    channels: HashMap<String, String>,
    next_callback_id: u64,
    next_order: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `channel` currently routes to a room.
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Room currently routed on `channel`.
    pub fn room_for_channel_mut(&mut self, channel: &str) -> Option<&mut Room> {
        let room_id = self.channels.get(channel)?;
        self.rooms.get_mut(room_id)
    }

    /// Register `registration` on the room identified by `key`.
    pub fn subscribe(
        &mut self,
        key: RoomKey,
        volatile: Map<String, JsonValue>,
        registration: Registration,
        waiter: SubscribeWaiter,
    ) -> SubscribeOutcome {
        let room_id = key.room_id();
        let callback_id = self.next_callback_id;
        self.next_callback_id += 1;

        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.handlers.insert(callback_id, registration);
            return match (room.state, room.channel.clone()) {
                (RoomState::Active, Some(channel)) => {
                    let ack = SubscribeAck {
                        room_id: room_id.clone(),
                        callback_id,
                        channel,
                    };
                    if waiter.send(Ok(ack)).is_err() {
                        room.handlers.remove(&callback_id);
                    }
                    SubscribeOutcome::Joined {
                        room_id,
                        callback_id,
                    }
                },
                (state, _) => {
                    if state == RoomState::Cancelled {
                        log::debug!("[doclink] Reviving cancelled room {}", room_id);
                        room.state = RoomState::Subscribing;
                    }
                    room.waiters.push((callback_id, waiter));
                    SubscribeOutcome::Pending {
                        room_id,
                        callback_id,
                    }
                },
            };
        }

        let order = self.next_order;
        self.next_order += 1;
        let mut room = Room::new(room_id.clone(), key, volatile, order);
        room.handlers.insert(callback_id, registration);
        room.waiters.push((callback_id, waiter));
        self.rooms.insert(room_id.clone(), room);
        SubscribeOutcome::NeedsSubscribe {
            room_id,
            callback_id,
        }
    }

    /// Record that a subscribe call for `room_id` reached the transport.
    pub fn mark_sent(&mut self, room_id: &str, request_id: &str) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.outstanding = Some(request_id.to_string());
        }
    }

    /// Apply a successful subscribe acknowledgment.
    pub fn on_subscribed(
        &mut self,
        room_id: &str,
        request_id: &str,
        backend_room_id: String,
        channel: String,
    ) -> AckOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return AckOutcome::Stale;
        };
        if room.outstanding.as_deref() != Some(request_id) {
            return AckOutcome::Stale;
        }
        room.outstanding = None;

        if room.state == RoomState::Cancelled {
            self.remove_room(room_id);
            return AckOutcome::NeedsUnsubscribe { backend_room_id };
        }

        let replayed = room.state == RoomState::Resubscribing;
        room.state = RoomState::Active;
        room.backend_room_id = Some(backend_room_id.clone());
        if let Some(old) = room.channel.replace(channel.clone()) {
            if old != channel {
                self.channels.remove(&old);
            }
        }

        for (callback_id, waiter) in std::mem::take(&mut room.waiters) {
            let ack = SubscribeAck {
                room_id: room_id.to_string(),
                callback_id,
                channel: channel.clone(),
            };
            if waiter.send(Ok(ack)).is_err() {
                log::debug!(
                    "[doclink] Subscriber {} of room {} went away before the ack",
                    callback_id,
                    room_id
                );
                room.handlers.remove(&callback_id);
            }
        }

        if room.handlers.is_empty() {
            self.remove_room(room_id);
            return AckOutcome::NeedsUnsubscribe { backend_room_id };
        }

        self.channels.insert(channel, room_id.to_string());
        AckOutcome::Active { replayed }
    }

    /// Apply a rejected or timed-out subscribe: the room is dropped and every
    /// waiter receives `err`.
    pub fn on_subscribe_failed(
        &mut self,
        room_id: &str,
        request_id: &str,
        err: &DocLinkError,
    ) -> Option<FailedRoom> {
        let room = self.rooms.get(room_id)?;
        if room.outstanding.as_deref() != Some(request_id) {
            return None;
        }
        let mut room = self.remove_room(room_id)?;
        room.fail_waiters(err);
        Some(FailedRoom {
            room_id: room.room_id,
            collection: room.key.collection,
            was_replay: room.state == RoomState::Resubscribing,
        })
    }

    /// Drop a room whose subscribe never reached the transport.
    pub fn fail_unsent(&mut self, room_id: &str, err: &DocLinkError) {
        if let Some(mut room) = self.remove_room(room_id) {
            room.fail_waiters(err);
        }
    }

    /// Remove one handler.
    pub fn unsubscribe(&mut self, room_id: &str, callback_id: u64) -> UnsubscribeOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return UnsubscribeOutcome::NotFound;
        };
        if room.handlers.remove(&callback_id).is_none() {
            return UnsubscribeOutcome::NotFound;
        }
        if let Some(pos) = room.waiters.iter().position(|(id, _)| *id == callback_id) {
            let (_, waiter) = room.waiters.remove(pos);
            let _ = waiter.send(Err(DocLinkError::Cancelled));
        }
        if !room.handlers.is_empty() {
            return UnsubscribeOutcome::Removed;
        }

        if room.outstanding.is_some() {
            room.state = RoomState::Cancelled;
            return UnsubscribeOutcome::Cancelled;
        }

        let acknowledged = room.state == RoomState::Active;
        let backend_room_id = room.backend_room_id.clone();
        self.remove_room(room_id);
        match (acknowledged, backend_room_id) {
            (true, Some(backend_room_id)) => UnsubscribeOutcome::NeedsUnsubscribe { backend_room_id },
            _ => UnsubscribeOutcome::Discarded,
        }
    }

    /// Rooms to (re)issue after the transport opened, in creation order.
    ///
    /// ACTIVE rooms move to RESUBSCRIBING. Rooms with a call already in
    /// flight are skipped.
    pub fn rooms_to_replay(&mut self) -> Vec<String> {
        let mut rooms: Vec<&mut Room> = self
            .rooms
            .values_mut()
            .filter(|room| room.outstanding.is_none() && room.state != RoomState::Cancelled)
            .collect();
        rooms.sort_by_key(|room| room.order);
        rooms
            .into_iter()
            .map(|room| {
                if room.state == RoomState::Active {
                    room.state = RoomState::Resubscribing;
                }
                room.room_id.clone()
            })
            .collect()
    }

    /// The transport went away: in-flight subscribes are void.
    ///
    /// Cancelled rooms are dropped since the backend forgets subscriptions of
    /// a closed connection.
    pub fn connection_lost(&mut self) {
        let cancelled: Vec<String> = self
            .rooms
            .values()
            .filter(|room| room.state == RoomState::Cancelled)
            .map(|room| room.room_id.clone())
            .collect();
        for room_id in cancelled {
            self.remove_room(&room_id);
        }
        for room in self.rooms.values_mut() {
            room.outstanding = None;
        }
    }

    /// Fail every room that was never acknowledged. Previously ACTIVE rooms
    /// are kept for the next successful connection.
    pub fn fail_unacknowledged(&mut self, err: &DocLinkError) {
        let doomed: Vec<String> = self
            .rooms
            .values()
            .filter(|room| matches!(room.state, RoomState::Subscribing | RoomState::Cancelled))
            .map(|room| room.room_id.clone())
            .collect();
        for room_id in doomed {
            self.fail_unsent(&room_id, err);
        }
        for room in self.rooms.values_mut() {
            room.outstanding = None;
        }
    }

    /// Tear everything down, failing every waiter with `err`.
    pub fn clear(&mut self, err: &DocLinkError) {
        for (_, mut room) in self.rooms.drain() {
            room.fail_waiters(err);
        }
        self.channels.clear();
    }

    /// Snapshot of every room, in creation order.
    pub fn snapshot(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        rooms.sort_by_key(|room| room.order);
        rooms.into_iter().map(Room::info).collect()
    }

    fn remove_room(&mut self, room_id: &str) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        if let Some(channel) = &room.channel {
            if self.channels.get(channel).map(String::as_str) == Some(room_id) {
                self.channels.remove(channel);
            }
        }
        Some(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Notification, SubscribeScope, UserScope};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn key(room: &str) -> RoomKey {
        RoomKey {
            collection: "messages".into(),
            filters: json!({"equals": {"room": room}}),
            subscribe_to_self: true,
            scope: SubscribeScope::All,
            users: UserScope::None,
        }
    }

    fn registration() -> Registration {
        Registration {
            handler: Arc::new(|_: &Notification| {}),
            notify_resubscribed: false,
        }
    }

    fn waiter() -> (
        SubscribeWaiter,
        oneshot::Receiver<Result<SubscribeAck, DocLinkError>>,
    ) {
        oneshot::channel()
    }

    fn subscribe(
        registry: &mut SubscriptionRegistry,
        room: &str,
    ) -> (SubscribeOutcome, oneshot::Receiver<Result<SubscribeAck, DocLinkError>>) {
        let (tx, rx) = waiter();
        (registry.subscribe(key(room), Map::new(), registration(), tx), rx)
    }

    #[test]
    fn test_second_subscribe_joins_without_network_call() {
        let mut registry = SubscriptionRegistry::new();
        let (first, mut rx1) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe { room_id, .. } = first else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");

        let (second, mut rx2) = subscribe(&mut registry, "lobby");
        assert!(matches!(second, SubscribeOutcome::Pending { .. }));

        assert_eq!(
            registry.on_subscribed(&room_id, "req-1", "backend-1".into(), "chan-1".into()),
            AckOutcome::Active { replayed: false }
        );
        assert_eq!(rx1.try_recv().unwrap().unwrap().channel, "chan-1");
        assert_eq!(rx2.try_recv().unwrap().unwrap().channel, "chan-1");

        let (third, mut rx3) = subscribe(&mut registry, "lobby");
        assert!(matches!(third, SubscribeOutcome::Joined { .. }));
        assert!(rx3.try_recv().unwrap().is_ok());
        assert_eq!(registry.get(&room_id).unwrap().handlers.len(), 3);
        assert!(registry.room_for_channel_mut("chan-1").is_some());
    }

    #[test]
    fn test_unsubscribe_while_in_flight_cancels_then_cleans_up() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, mut rx) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe {
            room_id,
            callback_id,
        } = outcome
        else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");

        assert_eq!(
            registry.unsubscribe(&room_id, callback_id),
            UnsubscribeOutcome::Cancelled
        );
        assert_eq!(rx.try_recv().unwrap(), Err(DocLinkError::Cancelled));
        assert_eq!(registry.get(&room_id).unwrap().state, RoomState::Cancelled);
        assert!(registry.rooms_to_replay().is_empty());

        assert_eq!(
            registry.on_subscribed(&room_id, "req-1", "backend-1".into(), "chan-1".into()),
            AckOutcome::NeedsUnsubscribe {
                backend_room_id: "backend-1".into()
            }
        );
        assert_eq!(registry.snapshot().len(), 0);
        assert!(registry.room_for_channel_mut("chan-1").is_none());
    }

    #[test]
    fn test_cancelled_room_is_revived_by_identical_subscribe() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, _rx) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe {
            room_id,
            callback_id,
        } = outcome
        else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");
        registry.unsubscribe(&room_id, callback_id);

        let (revived, mut rx) = subscribe(&mut registry, "lobby");
        assert!(matches!(revived, SubscribeOutcome::Pending { .. }));
        assert_eq!(
            registry.on_subscribed(&room_id, "req-1", "b".into(), "c".into()),
            AckOutcome::Active { replayed: false }
        );
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_last_handler_of_active_room_needs_unsubscribe() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, _rx) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe {
            room_id,
            callback_id,
        } = outcome
        else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");
        registry.on_subscribed(&room_id, "req-1", "backend-1".into(), "chan-1".into());

        assert_eq!(registry.unsubscribe(&room_id, 999), UnsubscribeOutcome::NotFound);
        assert_eq!(
            registry.unsubscribe(&room_id, callback_id),
            UnsubscribeOutcome::NeedsUnsubscribe {
                backend_room_id: "backend-1".into()
            }
        );
        assert_eq!(registry.unsubscribe(&room_id, callback_id), UnsubscribeOutcome::NotFound);
    }

    #[test]
    fn test_dropped_waiter_removes_its_handler() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, rx) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe { room_id, .. } = outcome else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");
        drop(rx);

        assert_eq!(
            registry.on_subscribed(&room_id, "req-1", "backend-1".into(), "chan-1".into()),
            AckOutcome::NeedsUnsubscribe {
                backend_room_id: "backend-1".into()
            }
        );
        assert_eq!(registry.snapshot().len(), 0);
    }

    #[test]
    fn test_replay_cycle() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, _rx) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe { room_id, .. } = outcome else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");
        registry.on_subscribed(&room_id, "req-1", "b".into(), "chan-1".into());

        registry.connection_lost();
        assert_eq!(registry.get(&room_id).unwrap().state, RoomState::Active);

        assert_eq!(registry.rooms_to_replay(), vec![room_id.clone()]);
        assert_eq!(
            registry.get(&room_id).unwrap().state,
            RoomState::Resubscribing
        );
        registry.mark_sent(&room_id, "req-2");
        assert!(registry.rooms_to_replay().is_empty());

        assert_eq!(
            registry.on_subscribed(&room_id, "req-1", "b".into(), "chan-2".into()),
            AckOutcome::Stale
        );
        assert_eq!(
            registry.on_subscribed(&room_id, "req-2", "b".into(), "chan-2".into()),
            AckOutcome::Active { replayed: true }
        );
        assert!(registry.room_for_channel_mut("chan-1").is_none());
        assert!(registry.room_for_channel_mut("chan-2").is_some());
    }

    #[test]
    fn test_failed_subscribe_drops_room_and_fails_waiters() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, mut rx) = subscribe(&mut registry, "lobby");
        let SubscribeOutcome::NeedsSubscribe { room_id, .. } = outcome else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");
        let err = DocLinkError::SubscriptionError("forbidden".into());
        let failed = registry.on_subscribe_failed(&room_id, "req-1", &err).unwrap();
        assert!(!failed.was_replay);
        assert_eq!(rx.try_recv().unwrap(), Err(err));
        assert_eq!(registry.snapshot().len(), 0);
    }

    #[test]
    fn test_fail_unacknowledged_keeps_active_rooms() {
        let mut registry = SubscriptionRegistry::new();
        let (outcome, _rx) = subscribe(&mut registry, "active");
        let SubscribeOutcome::NeedsSubscribe { room_id, .. } = outcome else {
            panic!("expected NeedsSubscribe");
        };
        registry.mark_sent(&room_id, "req-1");
        registry.on_subscribed(&room_id, "req-1", "b".into(), "chan".into());
        let (_, mut pending_rx) = subscribe(&mut registry, "pending");

        registry.fail_unacknowledged(&DocLinkError::NotConnected("gave up".into()));
        assert!(matches!(
            pending_rx.try_recv().unwrap(),
            Err(DocLinkError::NotConnected(_))
        ));
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.get(&room_id).is_some());
    }

    #[test]
    fn test_clear_fails_waiters_with_closed() {
        let mut registry = SubscriptionRegistry::new();
        let (_, mut rx) = subscribe(&mut registry, "lobby");
        registry.clear(&DocLinkError::Closed);
        assert_eq!(rx.try_recv().unwrap(), Err(DocLinkError::Closed));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_in_creation_order() {
        let mut registry = SubscriptionRegistry::new();
        let (_, _a) = subscribe(&mut registry, "a");
        let (_, _b) = subscribe(&mut registry, "b");
        let rooms = registry.snapshot();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].filters, json!({"equals": {"room": "a"}}));
        assert_eq!(rooms[0].state, RoomState::Subscribing);
        assert!(!rooms[0].subscribe_in_flight);
    }
}
