//! Transport abstraction.
//!
//! The session never talks to sockets directly. It drives a [`Transport`]
//! and receives its events through a [`TransportEventSender`]. Each call to
//! [`Transport::open`] gets a sender tagged with a fresh epoch, so events from
//! a connection the session already abandoned are recognised and ignored.
//!
//! - [`websocket`]: [`WebSocketTransport`] on top of `tokio-tungstenite`

pub mod websocket;

pub use websocket::WebSocketTransport;

use crate::error::Result;
use crate::event_handlers::DisconnectReason;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Event reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and frames may be sent.
    Open,
    /// A complete inbound frame.
    Message(Bytes),
    /// The connection closed (or could not be opened).
    Close(DisconnectReason),
    /// A transport-level failure. The session treats it like a close.
    Error(String),
}

/// Duplex connection driven by the session.
///
/// Implementations must not block: `open` starts connecting and returns,
/// completion is reported with [`TransportEvent::Open`] or
/// [`TransportEvent::Close`]/[`TransportEvent::Error`].
pub trait Transport: Send + 'static {
    fn open(&mut self, events: TransportEventSender);

    /// Queue one outbound frame. Only called between `Open` and `close`.
    fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Tear the connection down. Must be idempotent. No event has to follow.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, events: TransportEventSender) {
        (**self).open(events)
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Epoch-tagged handle a transport uses to report events.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEventSender {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { epoch, tx }
    }

    /// Connection epoch this sender belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event. Returns `false` once the session has shut down.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }

    pub fn opened(&self) -> bool {
        self.send(TransportEvent::Open)
    }

    pub fn message(&self, frame: impl Into<Bytes>) -> bool {
        self.send(TransportEvent::Message(frame.into()))
    }

    pub fn closed(&self, reason: DisconnectReason) -> bool {
        self.send(TransportEvent::Close(reason))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(message.into()))
    }

    /// Returns `true` once the session side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_tags_events_with_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = TransportEventSender::new(7, tx);
        assert_eq!(sender.epoch(), 7);
        assert!(sender.opened());
        assert!(sender.message(&b"{}"[..]));
        assert!(sender.closed(DisconnectReason::with_code("bye", 1000)));

        assert_eq!(rx.try_recv().unwrap(), (7, TransportEvent::Open));
        assert_eq!(
            rx.try_recv().unwrap(),
            (7, TransportEvent::Message(Bytes::from_static(b"{}")))
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            (7, TransportEvent::Close(reason)) if reason.code == Some(1000)
        ));
    }

    #[test]
    fn test_sender_reports_dropped_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = TransportEventSender::new(1, tx);
        drop(rx);
        assert!(sender.is_closed());
        assert!(!sender.error("late"));
    }
}
