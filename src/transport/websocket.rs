//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each [`open`](Transport::open) spawns a connection task that owns the
//! socket. Outbound frames reach it through an unbounded channel; inbound
//! frames, closes and failures are reported through the epoch-tagged
//! [`TransportEventSender`].

use super::{Transport, TransportEventSender};
use crate::connection::FAR_FUTURE;
use crate::error::{DocLinkError, Result};
use crate::event_handlers::DisconnectReason;
use crate::timeouts::DocLinkTimeouts;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{error::Error as WsError, protocol::Message};
use url::Url;

/// Maximum inbound text frame size (64 MiB).
const MAX_TEXT_FRAME_BYTES: usize = 64 << 20;

/// [`Transport`] speaking JSON text frames over a WebSocket.
///
/// # Example
///
/// ```rust,no_run
/// use doclink::{DocLinkClient, DocLinkTimeouts, WebSocketTransport};
///
/// # fn example() -> doclink::Result<()> {
/// let transport = WebSocketTransport::new("wss://backend.example.com:7512")?
///     .with_timeouts(&DocLinkTimeouts::relaxed());
/// let client = DocLinkClient::builder().transport(transport).build()?;
/// # Ok(())
/// # }
/// ```
pub struct WebSocketTransport {
    url: Url,
    connection_timeout: Duration,
    keepalive_interval: Duration,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url.as_str())
            .field("connection_timeout", &self.connection_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("open", &self.outbound.is_some())
            .finish()
    }
}

impl WebSocketTransport {
    /// Create a transport for `url` (`ws://` or `wss://`).
    pub fn new(url: &str) -> Result<Self> {
        let defaults = DocLinkTimeouts::default();
        Ok(Self {
            url: resolve_ws_url(url)?,
            connection_timeout: defaults.connection_timeout,
            keepalive_interval: defaults.keepalive_interval,
            outbound: None,
            stop: None,
            task: None,
        })
    }

    /// Apply the connection timeout and keepalive interval from `timeouts`.
    pub fn with_timeouts(mut self, timeouts: &DocLinkTimeouts) -> Self {
        self.connection_timeout = timeouts.connection_timeout;
        self.keepalive_interval = timeouts.keepalive_interval;
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, events: TransportEventSender) {
        self.close();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let url = self.url.to_string();
        let connection_timeout = self.connection_timeout;
        let keepalive = jitter_keepalive_interval(self.keepalive_interval, &url);

        log::debug!("[doclink] Opening WebSocket to {} (epoch {})", url, events.epoch());
        self.task = Some(tokio::spawn(run_connection(
            url,
            connection_timeout,
            keepalive,
            events,
            out_rx,
            stop_rx,
        )));
        self.outbound = Some(out_tx);
        self.stop = Some(stop_tx);
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| DocLinkError::NotConnected("WebSocket is not open".to_string()))?;
        let text = String::from_utf8(frame.to_vec()).map_err(|e| {
            DocLinkError::SerializationError(format!("Outbound frame is not UTF-8: {}", e))
        })?;
        outbound
            .send(Message::Text(text.into()))
            .map_err(|_| DocLinkError::TransportError("WebSocket task has stopped".to_string()))
    }

    fn close(&mut self) {
        self.outbound = None;
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        // The task closes the socket itself once it sees the stop signal.
        self.task = None;
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn resolve_ws_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        DocLinkError::ConfigurationError(format!("Invalid WebSocket URL '{}': {}", raw, e))
    })?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(DocLinkError::ConfigurationError(format!(
                "Unsupported URL scheme '{}'; expected ws(s) or http(s)",
                other
            )));
        },
    };
    if url.host_str().is_none() {
        return Err(DocLinkError::ConfigurationError(
            "WebSocket URL must include a host".to_string(),
        ));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(DocLinkError::ConfigurationError(
            "WebSocket URL must not embed credentials".to_string(),
        ));
    }
    url.set_scheme(scheme).map_err(|_| {
        DocLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    url.set_fragment(None);
    Ok(url)
}

/// Spread keepalive pings of different clients across a +/-20% window.
///
/// The offset is derived from `seed` so a reconnection keeps its phase.
fn jitter_keepalive_interval(base: Duration, seed: &str) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms <= 1 {
        return base;
    }

    let jitter_span = (base_ms / 5).max(1);
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let offset = (hasher.finish() % (2 * jitter_span + 1)) as i64 - jitter_span as i64;
    let jittered_ms = if offset >= 0 {
        base_ms.saturating_add(offset as u64)
    } else {
        base_ms.saturating_sub(offset.unsigned_abs()).max(1)
    };
    Duration::from_millis(jittered_ms)
}

async fn run_connection(
    url: String,
    connection_timeout: Duration,
    keepalive: Duration,
    events: TransportEventSender,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut stop: oneshot::Receiver<()>,
) {
    let connect = async {
        if DocLinkTimeouts::is_no_timeout(connection_timeout) {
            Ok(connect_async(url.as_str()).await)
        } else {
            tokio::time::timeout(connection_timeout, connect_async(url.as_str())).await
        }
    };

    let result = tokio::select! {
        biased;
        _ = &mut stop => return,
        result = connect => result,
    };

    let ws = match result {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(WsError::Http(response))) => {
            let message = match response.status().as_u16() {
                401 => "Unauthorized: WebSocket upgrade rejected".to_string(),
                403 => "Forbidden: Access to WebSocket denied".to_string(),
                code => format!("WebSocket HTTP error: {}", code),
            };
            events.error(message);
            return;
        },
        Ok(Err(e)) => {
            events.error(format!("Connection failed: {}", e));
            return;
        },
        Err(_) => {
            events.error(format!("Connection timeout ({:?})", connection_timeout));
            return;
        },
    };

    log::info!("[doclink] WebSocket connected to {}", url);
    events.opened();

    let (mut sink, mut stream) = ws.split();
    let has_keepalive = !keepalive.is_zero();
    let keepalive_dur = if has_keepalive { keepalive } else { FAR_FUTURE };
    let mut idle_deadline = Instant::now() + keepalive_dur;

    loop {
        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);

        tokio::select! {
            biased;

            _ = &mut stop => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                log::debug!("[doclink] WebSocket closed by client");
                return;
            }

            out = outbound.recv() => {
                let Some(message) = out else {
                    let _ = sink.close().await;
                    return;
                };
                if let Err(e) = sink.send(message).await {
                    events.error(format!("Failed to send frame: {}", e));
                    return;
                }
                idle_deadline = Instant::now() + keepalive_dur;
            }

            _ = &mut idle_sleep, if has_keepalive => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    events.error(format!("Keepalive ping failed: {}", e));
                    return;
                }
                idle_deadline = Instant::now() + keepalive_dur;
            }

            frame = stream.next() => {
                idle_deadline = Instant::now() + keepalive_dur;
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_TEXT_FRAME_BYTES {
                            log::warn!("[doclink] Dropping oversized frame ({} bytes)", text.len());
                            continue;
                        }
                        events.message(Bytes::copy_from_slice(text.as_bytes()));
                    },
                    Some(Ok(Message::Binary(data))) => {
                        events.message(data);
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                        events.closed(reason);
                        return;
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    },
                    Some(Ok(Message::Pong(_))) => {
                        log::debug!("[doclink] Keepalive: received Pong");
                    },
                    Some(Ok(Message::Frame(_))) => {},
                    Some(Err(e)) => {
                        events.error(format!("WebSocket error: {}", e));
                        return;
                    },
                    None => {
                        events.closed(DisconnectReason::new("WebSocket stream ended"));
                        return;
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ws_url_maps_http_schemes() {
        assert_eq!(
            resolve_ws_url("http://localhost:7512").unwrap().as_str(),
            "ws://localhost:7512/"
        );
        assert_eq!(
            resolve_ws_url(" https://example.com/ws#frag ").unwrap().as_str(),
            "wss://example.com/ws"
        );
        assert_eq!(
            resolve_ws_url("ws://127.0.0.1:7512").unwrap().as_str(),
            "ws://127.0.0.1:7512/"
        );
    }

    #[test]
    fn test_resolve_ws_url_rejects_bad_input() {
        for bad in ["not a url", "ftp://example.com", "ws://user:pw@example.com"] {
            assert!(
                matches!(resolve_ws_url(bad), Err(DocLinkError::ConfigurationError(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_keepalive_jitter_is_stable_and_bounded() {
        let base = Duration::from_secs(10);
        let a = jitter_keepalive_interval(base, "ws://a/");
        assert_eq!(a, jitter_keepalive_interval(base, "ws://a/"));
        assert!(a >= Duration::from_secs(8) && a <= Duration::from_secs(12));
        assert_eq!(jitter_keepalive_interval(Duration::ZERO, "x"), Duration::ZERO);
    }

    #[test]
    fn test_send_before_open_is_not_connected() {
        let mut transport = WebSocketTransport::new("ws://localhost:7512").unwrap();
        assert!(matches!(
            transport.send(Bytes::from_static(b"{}")),
            Err(DocLinkError::NotConnected(_))
        ));
        transport.close();
    }
}
