//! Caller-side handles for room subscriptions.

use super::room::SubscribeAck;
use crate::connection::SessionCmd;
use crate::error::{DocLinkError, Result};
use crate::models::Notification;
use tokio::sync::{mpsc, oneshot};

/// Handle to one registered room handler.
///
/// Dropping the handle leaves the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it. When the last handler of
/// a room leaves, the room is unsubscribed on the backend.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    callback_id: u64,
    channel: String,
    cmd_tx: mpsc::WeakSender<SessionCmd>,
}

impl RoomHandle {
    pub(crate) fn new(ack: SubscribeAck, cmd_tx: mpsc::WeakSender<SessionCmd>) -> Self {
        Self {
            room_id: ack.room_id,
            callback_id: ack.callback_id,
            channel: ack.channel,
            cmd_tx,
        }
    }

    /// Client-side room id (shared by every identical subscription).
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Id of this handler within the room.
    pub fn callback_id(&self) -> u64 {
        self.callback_id
    }

    /// Backend channel notifications are routed on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove this handler. Unsubscribing twice is a no-op.
    pub async fn unsubscribe(&self) -> Result<()> {
        let cmd_tx = self.cmd_tx.upgrade().ok_or(DocLinkError::Closed)?;
        let (reply, rx) = oneshot::channel();
        cmd_tx
            .send(SessionCmd::Unsubscribe {
                room_id: self.room_id.clone(),
                callback_id: self.callback_id,
                reply: Some(reply),
            })
            .await
            .map_err(|_| DocLinkError::task_gone())?;
        rx.await.map_err(|_| DocLinkError::task_gone())?
    }
}

/// Pull-based room subscription.
///
/// Notifications are buffered until read with [`next`](Self::next). Dropping
/// the subscription unsubscribes its handler.
///
/// # Example
///
/// ```rust,no_run
/// use doclink::{DocLinkClient, SubscribeOptions};
/// use serde_json::json;
///
/// # async fn example(client: DocLinkClient) -> doclink::Result<()> {
/// let mut subscription = client
///     .subscribe_stream("messages", json!({"equals": {"room": "lobby"}}), SubscribeOptions::new())
///     .await?;
///
/// while let Some(notification) = subscription.next().await {
///     println!("{:?} {:?}", notification.action, notification.result);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RoomSubscription {
    handle: RoomHandle,
    rx: mpsc::UnboundedReceiver<Notification>,
    unsub_tx: Option<mpsc::UnboundedSender<(String, u64)>>,
}

impl RoomSubscription {
    pub(crate) fn new(
        handle: RoomHandle,
        rx: mpsc::UnboundedReceiver<Notification>,
        unsub_tx: mpsc::UnboundedSender<(String, u64)>,
    ) -> Self {
        Self {
            handle,
            rx,
            unsub_tx: Some(unsub_tx),
        }
    }

    pub fn room_id(&self) -> &str {
        self.handle.room_id()
    }

    pub fn channel(&self) -> &str {
        self.handle.channel()
    }

    pub fn handle(&self) -> &RoomHandle {
        &self.handle
    }

    /// Wait for the next notification.
    ///
    /// Returns `None` once the room is gone (session closed, or the room was
    /// dropped after a failed re-subscription).
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Next buffered notification, without waiting.
    pub fn try_next(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Unsubscribe and wait for the backend to confirm.
    pub async fn close(mut self) -> Result<()> {
        self.unsub_tx = None;
        self.handle.unsubscribe().await
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        if let Some(tx) = self.unsub_tx.take() {
            let _ = tx.send((self.handle.room_id.clone(), self.handle.callback_id));
        }
    }
}

impl std::fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("room_id", &self.handle.room_id)
            .field("channel", &self.handle.channel)
            .field("closed", &self.unsub_tx.is_none())
            .finish()
    }
}
