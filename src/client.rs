//! Main doclink client with builder pattern.
//!
//! [`DocLinkClient`] is a cheap, cloneable handle to one logical session. The
//! session itself lives in a background task; every method sends it a command
//! and awaits the answer.

use crate::{
    connection::{run_session, ConnectionStateMachine, QueryReply, SessionCmd, COMMAND_CHANNEL_CAPACITY},
    error::{DocLinkError, Result},
    event_handlers::EventHandlers,
    models::{
        ConnectionOptions, ConnectionState, Notification, QueryOptions, Request, Response,
        RoomInfo, SubscribeOptions,
    },
    subscription::{
        room::{Registration, RoomKey, SubscribeAck},
        RoomHandle, RoomSubscription,
    },
    timeouts::DocLinkTimeouts,
    transport::{Transport, WebSocketTransport},
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Default value stamped into `volatile.sdkName`.
const DEFAULT_SDK_NAME: &str = concat!("doclink@", env!("CARGO_PKG_VERSION"));

/// Client session for a document/real-time backend.
///
/// Use [`DocLinkClientBuilder`] to construct instances with custom configuration.
/// Clones share the same session; it is closed when the last clone is dropped
/// or [`close`](Self::close) is called.
///
/// # Examples
///
/// ```rust,no_run
/// use doclink::{DocLinkClient, QueryOptions, Request};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = DocLinkClient::builder()
///     .url("ws://localhost:7512")
///     .build()?;
/// client.connect().await?;
///
/// let response = client
///     .query(
///         Request::new("document", "create")
///             .with_collection("messages")
///             .with_body(json!({"text": "hello"})),
///         QueryOptions::default(),
///     )
///     .await?;
/// println!("Created: {}", response.result);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocLinkClient {
    cmd_tx: mpsc::Sender<SessionCmd>,
    unsub_tx: mpsc::UnboundedSender<(String, u64)>,
    state_rx: watch::Receiver<ConnectionState>,
    sdk_instance_id: Arc<str>,
    connection_options: ConnectionOptions,
    timeouts: DocLinkTimeouts,
}

impl std::fmt::Debug for DocLinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocLinkClient")
            .field("state", &self.state())
            .field("sdk_instance_id", &self.sdk_instance_id)
            .finish()
    }
}

impl DocLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> DocLinkClientBuilder {
        DocLinkClientBuilder::new()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Instance id stamped into every request's `volatile.sdkInstanceId`.
    pub fn sdk_instance_id(&self) -> &str {
        &self.sdk_instance_id
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &DocLinkTimeouts {
        &self.timeouts
    }

    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.connection_options
    }

    /// Connect (or reconnect) the session.
    ///
    /// Resolves once the session is CONNECTED, with the offline queue
    /// flushed and room replay issued. Fails with the connection error if
    /// the session ends up in ERROR, `NotConnected` if `disconnect()` is
    /// called meanwhile, and `Closed` once the session is closed.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::Connect { reply }).await?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Close the connection and stay OFFLINE until the next [`connect`](Self::connect).
    ///
    /// Rooms are kept and replayed on reconnection; queuable requests issued
    /// meanwhile wait in the offline queue.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::Disconnect { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    /// Close the session for good.
    ///
    /// Every pending and queued request and every room waiter fails with
    /// [`DocLinkError::Closed`]. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        match self.command(SessionCmd::Close { reply }).await {
            Ok(()) => rx.await.map_err(|_| self.gone()),
            Err(_) if self.state() == ConnectionState::Closed => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Send a request and wait for its response.
    ///
    /// While the session is not connected the request waits in the offline
    /// queue (unless queuing is disabled globally or by
    /// [`QueryOptions::queuable`]). An error payload from the backend
    /// resolves as [`DocLinkError::ServerError`].
    pub async fn query(&self, request: Request, options: QueryOptions) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::Query {
            request,
            options,
            reply: QueryReply::Response(reply),
        })
        .await?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Callback form of [`query`](Self::query).
    ///
    /// The callback runs on a Tokio task once the request resolves.
    pub fn query_with_callback<F>(&self, request: Request, options: QueryOptions, callback: F)
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let submitted = self.submit(SessionCmd::Query {
            request,
            options,
            reply: QueryReply::Response(reply),
        });
        let client = self.clone();
        tokio::spawn(async move {
            let result = match submitted.await {
                Ok(()) => rx.await.unwrap_or_else(|_| Err(client.gone())),
                Err(e) => Err(e),
            };
            callback(result);
        });
    }

    /// Fire-and-forget: resolves once the request is written or queued.
    /// The response is discarded.
    pub async fn send(&self, request: Request, options: QueryOptions) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::Query {
            request,
            options,
            reply: QueryReply::Accepted(reply),
        })
        .await?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Subscribe `handler` to notifications about `collection` documents
    /// matching `filters`.
    ///
    /// Identical subscriptions share one room and one backend subscription.
    /// Resolves once the room is acknowledged. While disconnected (with
    /// queuing enabled) the room is subscribed on the next connection.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use doclink::{DocLinkClient, SubscribeOptions};
    /// use serde_json::json;
    ///
    /// # async fn example(client: DocLinkClient) -> doclink::Result<()> {
    /// let room = client
    ///     .subscribe(
    ///         "messages",
    ///         json!({"equals": {"room": "lobby"}}),
    ///         SubscribeOptions::new(),
    ///         |notification| println!("{:?}", notification.result),
    ///     )
    ///     .await?;
    /// room.unsubscribe().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn subscribe<F>(
        &self,
        collection: impl Into<String>,
        filters: JsonValue,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<RoomHandle>
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let (cmd, rx) = self.subscribe_cmd(collection.into(), filters, options, Arc::new(handler))?;
        self.command(cmd).await?;
        let ack = rx.await.map_err(|_| self.gone())??;
        Ok(self.handle_for(ack))
    }

    /// Callback form of [`subscribe`](Self::subscribe).
    pub fn subscribe_with_callback<F, C>(
        &self,
        collection: impl Into<String>,
        filters: JsonValue,
        options: SubscribeOptions,
        handler: F,
        callback: C,
    ) where
        F: Fn(&Notification) + Send + Sync + 'static,
        C: FnOnce(Result<RoomHandle>) + Send + 'static,
    {
        let (cmd, rx) =
            match self.subscribe_cmd(collection.into(), filters, options, Arc::new(handler)) {
                Ok(prepared) => prepared,
                Err(e) => {
                    tokio::spawn(async move { callback(Err(e)) });
                    return;
                },
            };
        let submitted = self.submit(cmd);
        let client = self.clone();
        tokio::spawn(async move {
            let result: Result<RoomHandle> = async {
                submitted.await?;
                let ack = rx.await.map_err(|_| client.gone())??;
                Ok(client.handle_for(ack))
            }
            .await;
            callback(result);
        });
    }

    /// Pull-based subscription; see [`RoomSubscription`].
    pub async fn subscribe_stream(
        &self,
        collection: impl Into<String>,
        filters: JsonValue,
        options: SubscribeOptions,
    ) -> Result<RoomSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |notification: &Notification| {
            let _ = tx.send(notification.clone());
        };
        let handle = self.subscribe(collection, filters, options, handler).await?;
        Ok(RoomSubscription::new(handle, rx, self.unsub_tx.clone()))
    }

    /// Snapshot of every room known to the session.
    pub async fn rooms(&self) -> Result<Vec<RoomInfo>> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::ListRooms { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    /// Number of requests waiting in the offline queue.
    pub async fn queue_len(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::QueueLen { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    /// Drop every queued request; each caller receives `QueueDiscarded`.
    /// Returns the number of dropped requests.
    pub async fn clear_offline_queue(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCmd::ClearQueue { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    // ── internals ───────────────────────────────────────────────────────────

    async fn command(&self, cmd: SessionCmd) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| self.gone())
    }

    /// Enqueue `cmd` now when the channel has room, so callback-style calls
    /// keep their order relative to later calls.
    fn submit(&self, cmd: SessionCmd) -> impl std::future::Future<Output = Result<()>> + Send + 'static {
        let outcome = match self.cmd_tx.try_send(cmd) {
            Ok(()) => Ok(None),
            Err(mpsc::error::TrySendError::Full(cmd)) => Ok(Some((self.cmd_tx.clone(), cmd))),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(self.gone()),
        };
        let gone = self.gone();
        async move {
            match outcome? {
                None => Ok(()),
                Some((cmd_tx, cmd)) => cmd_tx.send(cmd).await.map_err(|_| gone),
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn subscribe_cmd(
        &self,
        collection: String,
        filters: JsonValue,
        options: SubscribeOptions,
        handler: Arc<dyn Fn(&Notification) + Send + Sync>,
    ) -> Result<(SessionCmd, oneshot::Receiver<Result<SubscribeAck>>)> {
        if collection.trim().is_empty() {
            return Err(DocLinkError::InvalidRequest(
                "collection must not be empty".to_string(),
            ));
        }
        let key = RoomKey {
            collection,
            filters,
            subscribe_to_self: options
                .subscribe_to_self
                .unwrap_or(self.connection_options.subscribe_to_self),
            scope: options.scope,
            users: options.users,
        };
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCmd::Subscribe {
            key,
            volatile: options.volatile,
            registration: Registration {
                handler,
                notify_resubscribed: options.notify_resubscribed,
            },
            reply,
        };
        Ok((cmd, rx))
    }

    fn handle_for(&self, ack: SubscribeAck) -> RoomHandle {
        RoomHandle::new(ack, self.cmd_tx.downgrade())
    }

    /// Error for a session task that no longer answers.
    fn gone(&self) -> DocLinkError {
        if self.state() == ConnectionState::Closed {
            DocLinkError::Closed
        } else {
            DocLinkError::task_gone()
        }
    }
}

/// Builder for configuring [`DocLinkClient`] instances.
pub struct DocLinkClientBuilder {
    url: Option<String>,
    transport: Option<Box<dyn Transport>>,
    connection_options: ConnectionOptions,
    timeouts: DocLinkTimeouts,
    event_handlers: EventHandlers,
    sdk_name: String,
}

impl DocLinkClientBuilder {
    fn new() -> Self {
        Self {
            url: None,
            transport: None,
            connection_options: ConnectionOptions::default(),
            timeouts: DocLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
            sdk_name: DEFAULT_SDK_NAME.to_string(),
        }
    }

    /// Connect over a [`WebSocketTransport`] to `url`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Use a custom transport. Takes precedence over [`url`](Self::url).
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Set reconnection and offline queue behavior
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use doclink::{ConnectionOptions, DocLinkClient, QueuePolicy};
    ///
    /// # async fn example() -> doclink::Result<()> {
    /// let client = DocLinkClient::builder()
    ///     .url("ws://localhost:7512")
    ///     .connection_options(
    ///         ConnectionOptions::new()
    ///             .with_offline_queue_capacity(50)
    ///             .with_queue_policy(QueuePolicy::RejectNewest),
    ///     )
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Set comprehensive timeout configuration for all operations
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use doclink::{DocLinkClient, DocLinkTimeouts};
    ///
    /// # async fn example() -> doclink::Result<()> {
    /// let client = DocLinkClient::builder()
    ///     .url("ws://localhost:7512")
    ///     .timeouts(DocLinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: DocLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Register connection lifecycle hooks.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Override the `volatile.sdkName` value sent with every request.
    pub fn sdk_name(mut self, name: impl Into<String>) -> Self {
        self.sdk_name = name.into();
        self
    }

    /// Build the client and start its session task.
    ///
    /// Must be called from within a Tokio runtime. The session starts in
    /// INITIAL; call [`DocLinkClient::connect`] to open it.
    pub fn build(self) -> Result<DocLinkClient> {
        self.connection_options.validate()?;

        let transport: Box<dyn Transport> = match (self.transport, self.url) {
            (Some(transport), _) => transport,
            (None, Some(url)) => {
                Box::new(WebSocketTransport::new(&url)?.with_timeouts(&self.timeouts))
            },
            (None, None) => {
                return Err(DocLinkError::ConfigurationError(
                    "url or transport is required".into(),
                ))
            },
        };

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DocLinkError::ConfigurationError(
                "DocLinkClient must be built inside a Tokio runtime".into(),
            )
        })?;

        let sdk_instance_id = uuid::Uuid::new_v4().to_string();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (unsub_tx, unsub_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initial);

        let machine = ConnectionStateMachine::new(
            transport,
            events_tx,
            state_tx,
            self.connection_options.clone(),
            self.timeouts.clone(),
            self.event_handlers,
            sdk_instance_id.clone(),
            self.sdk_name,
        );
        runtime.spawn(run_session(machine, cmd_rx, events_rx, unsub_rx));
        log::debug!("[doclink] Session {} started", sdk_instance_id);

        Ok(DocLinkClient {
            cmd_tx,
            unsub_tx,
            state_rx,
            sdk_instance_id: Arc::from(sdk_instance_id),
            connection_options: self.connection_options,
            timeouts: self.timeouts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_url_or_transport() {
        let err = DocLinkClient::builder().build().unwrap_err();
        assert_eq!(
            err,
            DocLinkError::ConfigurationError("url or transport is required".into())
        );
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let err = DocLinkClient::builder()
            .url("ws://localhost:7512")
            .connection_options(ConnectionOptions::default().with_reconnect_jitter(2.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, DocLinkError::ConfigurationError(_)));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = DocLinkClient::builder()
            .url("ws://localhost:7512")
            .build()
            .unwrap_err();
        assert!(matches!(err, DocLinkError::ConfigurationError(msg) if msg.contains("Tokio")));
    }

    #[tokio::test]
    async fn test_requests_before_connect_fail_fast() {
        let client = DocLinkClient::builder()
            .url("ws://localhost:7512")
            .build()
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Initial);
        assert!(!client.sdk_instance_id().is_empty());

        let err = client
            .query(Request::new("server", "now"), QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocLinkError::NotConnected(_)));

        let err = client
            .subscribe("", serde_json::json!({}), SubscribeOptions::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, DocLinkError::InvalidRequest(_)));

        client.close().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        client.close().await.unwrap();
        assert_eq!(client.connect().await, Err(DocLinkError::Closed));
    }
}
