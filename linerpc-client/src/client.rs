//! Persistent line-delimited JSON-RPC client
//!
//! This module provides the main `LineRpcClient` type. It owns one transport
//! at a time and multiplexes requests, batches and notifications over it.
//!
//! # Client Lifecycle
//!
//! 1. **Connect**: open the transport and send the configured handshake
//! 2. **Use**: make requests and batches, listen for notifications
//! 3. **Reconnect**: on unexpected loss, fail pending work, wait, consult the
//!    reconnection strategy and connect again
//! 4. **Close**: `close()` is terminal; the client never reconnects afterwards
//!
//! # Tasks
//!
//! Every connection runs a reader task and a keepalive task, both bound to
//! the session they were started for. A scheduled reconnect is a short-lived
//! task of its own.
//!
//! # Cloning
//!
//! `LineRpcClient` is cheaply cloneable using `Arc` internally. All clones
//! share the same connection and state.

use crate::batch::{BatchParams, BatchResponse};
use crate::client_builder::ClientBuilder;
use crate::config::ClientConfig;
use crate::connection_state::{ConnectionManager, ConnectionState, Session};
use crate::keepalive::Keepalive;
use crate::metrics::ClientMetrics;
use crate::notification::{ListenerId, NotificationRouter};
use crate::reconnect::{ReconnectDecision, ReconnectionStrategy};
use crate::request::RequestManager;
use crate::transport::{BoxedStream, Connector};
use futures::{SinkExt, StreamExt};
use linerpc_core::codec::{self, LineCodec};
use linerpc_core::{Error, Message, Request, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::codec::{FramedRead, FramedWrite};

type FrameReader = FramedRead<ReadHalf<BoxedStream>, LineCodec>;
type FrameWriter = FramedWrite<WriteHalf<BoxedStream>, LineCodec>;

/// Write half of the current session
struct SessionWriter {
    session: Session,
    sink: FrameWriter,
}

/// Line-delimited JSON-RPC client over TCP or TLS
#[derive(Clone)]
pub struct LineRpcClient {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) request_manager: RequestManager,
    pub(crate) router: NotificationRouter,
    pub(crate) connection: Arc<ConnectionManager>,
    writer: Arc<Mutex<Option<SessionWriter>>>,
    keepalive: Arc<Keepalive>,
    strategy: Arc<Mutex<Box<dyn ReconnectionStrategy>>>,
    connect_lock: Arc<Mutex<()>>,
    server_version: Arc<RwLock<Option<Value>>>,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

impl LineRpcClient {
    pub(crate) fn from_parts(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        strategy: Box<dyn ReconnectionStrategy>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let keepalive = Keepalive::new(config.idle_timeout, config.probe_timeout);

        Self {
            config: Arc::new(config),
            connector,
            request_manager: RequestManager::new(),
            router: NotificationRouter::new(),
            connection: Arc::new(ConnectionManager::new()),
            writer: Arc::new(Mutex::new(None)),
            keepalive: Arc::new(keepalive),
            strategy: Arc::new(Mutex::new(strategy)),
            connect_lock: Arc::new(Mutex::new(())),
            server_version: Arc::new(RwLock::new(None)),
            metrics,
        }
    }

    /// Start configuring a client for `host:port`
    pub fn builder(host: impl Into<String>, port: u16) -> ClientBuilder {
        ClientBuilder::new(host, port)
    }

    /// Create an unconnected client from a configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::from_config(config).build()
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the current connection state
    pub async fn state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Check if the client is currently connected
    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Result of the most recent handshake
    pub async fn server_version_info(&self) -> Option<Value> {
        self.server_version.read().await.clone()
    }

    /// Number of requests and batches waiting for an answer
    pub async fn pending_requests(&self) -> usize {
        self.request_manager.pending_count().await
    }

    /// Connect to the server and send the configured handshake
    ///
    /// Returns immediately when already connected and fails with
    /// `Error::ClientClosed` after `close()`. When the transport cannot be
    /// opened the error is returned and the reconnection strategy takes
    /// over in the background, as it does for a dropped connection.
    #[tracing::instrument(skip(self), fields(target = %self.connector.target()))]
    pub async fn connect(&self) -> Result<()> {
        match self.open_session().await {
            Ok(true) => self.handshake().await,
            Ok(false) => Ok(()),
            Err(e) => {
                if !matches!(e, Error::ClientClosed | Error::Configuration(_)) {
                    self.schedule_reconnect();
                }
                Err(e)
            }
        }
    }

    /// Open a transport unless one is already up
    ///
    /// Returns `true` when a new session was started.
    async fn open_session(&self) -> Result<bool> {
        let _guard = self.connect_lock.lock().await;

        if !self.connection.connecting().await? {
            return Ok(false);
        }
        self.record_state(ConnectionState::Connecting);
        tracing::info!("Connecting to server");

        let stream = match self.connector.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                self.connection.connect_failed().await;
                self.record_state(ConnectionState::Disconnected);
                self.record_error(&e);
                tracing::error!(error = %e, "Connect failed");
                return Err(e);
            }
        };

        let Some(session) = self.connection.connected().await else {
            tracing::info!("Client closed while connecting");
            return Err(Error::ClientClosed);
        };

        let codec = match self.config.max_frame_length {
            Some(max) => LineCodec::with_max_length(max),
            None => LineCodec::new(),
        };
        let (read_half, write_half) = tokio::io::split(stream);
        *self.writer.lock().await = Some(SessionWriter {
            session: session.clone(),
            sink: FramedWrite::new(write_half, codec.clone()),
        });

        self.record_state(ConnectionState::Connected);
        tracing::info!(generation = session.generation(), "Connected successfully");

        tokio::spawn(
            self.clone()
                .read_loop(FramedRead::new(read_half, codec), session.clone()),
        );
        if self.config.keepalive {
            tokio::spawn(self.clone().keepalive_loop(session));
        }

        Ok(true)
    }

    async fn handshake(&self) -> Result<()> {
        let Some(handshake) = self.config.handshake.as_ref() else {
            return Ok(());
        };

        let params = vec![
            Value::from(handshake.client.as_str()),
            Value::from(handshake.version.as_str()),
        ];
        let info = self.request(handshake.method.as_str(), params).await?;

        tracing::info!(server = %info, "Handshake completed");
        *self.server_version.write().await = Some(info);
        Ok(())
    }

    /// Send a request and wait for its result
    ///
    /// Fails with `Error::NotConnected` without writing anything when the
    /// client is not connected. A server-side error is returned as
    /// `Error::Rpc` with the `error` member verbatim.
    #[tracing::instrument(skip(self, params), fields(method = %method.as_ref()))]
    pub async fn request(&self, method: impl Into<String> + AsRef<str>, params: Vec<Value>) -> Result<Value> {
        let method = method.into();
        let start = Instant::now();

        self.keepalive.touch();
        self.ensure_connected().await?;

        let id = self.request_manager.next_id();
        let body = codec::encode_request(&Request::new(method.clone(), params, id))?;

        // Register the pending request before sending
        let rx = self.request_manager.register(id).await;
        if let Err(e) = self.send_frame(body).await {
            self.request_manager.cancel(id).await;
            return Err(e);
        }

        tracing::debug!(id, "Request sent, waiting for response");

        let result = rx.await.unwrap_or(Err(Error::ConnectionClosed));
        self.finish(&method, start, &result);
        result
    }

    /// Send a request and deserialize its result
    pub async fn request_typed<R>(&self, method: impl Into<String> + AsRef<str>, params: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Call `method` once per element of `params` in a single frame
    ///
    /// Each call carries `[param]`, or `[param, second]` when a fixed second
    /// parameter is given. The ids are consecutive and the batch resolves
    /// when the response array carrying the last id arrives.
    #[tracing::instrument(skip(self, params, second), fields(method = %method.as_ref(), batch_size = params.len()))]
    pub async fn request_batch(
        &self,
        method: impl Into<String> + AsRef<str>,
        params: Vec<Value>,
        second: Option<Value>,
    ) -> Result<BatchResponse> {
        if params.is_empty() {
            return Err(Error::InvalidRequest("Batch cannot be empty".to_string()));
        }

        let method = method.into();
        let start = Instant::now();

        self.keepalive.touch();
        self.ensure_connected().await?;

        let size = params.len();
        let first = self.request_manager.next_ids(size);
        let mut requests = Vec::with_capacity(size);
        let mut mapping = BatchParams::new();
        for (id, param) in (first..).zip(params) {
            let call_params = match &second {
                Some(second) => vec![param.clone(), second.clone()],
                None => vec![param.clone()],
            };
            requests.push(Request::new(method.clone(), call_params, id));
            mapping.insert(id, param);
        }
        let body = codec::encode_batch(&requests)?;

        let (slot, rx) = self.request_manager.register_batch(mapping).await?;
        if let Err(e) = self.send_frame(body).await {
            self.request_manager.cancel(slot).await;
            return Err(e);
        }

        tracing::debug!(slot, "Batch request sent, waiting for responses");

        let result = rx.await.unwrap_or(Err(Error::ConnectionClosed));
        if let Some(m) = &self.metrics {
            m.record_batch(size as u64);
        }
        self.finish(&method, start, &result);
        result
    }

    /// Register a listener for `method` notifications and issue the
    /// subscription request
    ///
    /// The listener is registered first so no notification sent right after
    /// the answer is missed; it is removed again when the request fails.
    pub async fn subscribe<F>(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
        listener: F,
    ) -> Result<(ListenerId, Value)>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let method = method.into();
        let id = self.router.subscribe(method.clone(), listener).await;

        match self.request(method, params).await {
            Ok(initial) => Ok((id, initial)),
            Err(e) => {
                self.router.unsubscribe(id).await;
                Err(e)
            }
        }
    }

    /// Register a listener for a notification topic
    pub async fn on_notification<F>(&self, topic: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.router.subscribe(topic, listener).await
    }

    /// Receive the payloads of a notification topic on a channel
    pub async fn notifications(&self, topic: impl Into<String>) -> mpsc::UnboundedReceiver<Value> {
        self.router.subscribe_channel(topic).await
    }

    /// Remove a single listener
    pub async fn remove_listener(&self, id: ListenerId) -> bool {
        self.router.unsubscribe(id).await
    }

    /// Remove every listener of a topic
    pub async fn remove_all_listeners(&self, topic: &str) -> usize {
        self.router.remove_all(topic).await
    }

    /// Get the notification router
    pub fn notification_router(&self) -> &NotificationRouter {
        &self.router
    }

    /// Close the client for good
    ///
    /// Stops the reader, shuts the writer down and fails every pending
    /// request. No reconnect happens afterwards. Closing twice is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) {
        if !self.connection.close().await {
            return;
        }
        tracing::info!("Closing client");
        self.record_state(ConnectionState::Closed);

        // Unsent bytes of an abandoned write are discarded with the codec
        let writer = self.writer.lock().await.take();
        if let Some(writer) = writer {
            let mut half = writer.sink.into_inner();
            match tokio::time::timeout(self.config.probe_timeout, half.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Writer shutdown failed"),
                Err(_) => tracing::debug!("Writer shutdown timed out"),
            }
        }

        let failed = self.request_manager.fail_all(Error::ConnectionClosed).await;
        tracing::debug!(failed, "Pending requests failed on close");
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connection.is_connected().await {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Write one frame on the current session
    ///
    /// The write is abandoned as soon as the session ends, so a peer that
    /// stopped reading never holds the writer past teardown.
    async fn send_frame(&self, body: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let current = writer.as_mut().ok_or(Error::NotConnected)?;
        let session = current.session.clone();

        let sent = tokio::select! {
            biased;
            _ = session.token().cancelled() => {
                Err(session.reason().unwrap_or(Error::ConnectionClosed))
            }
            sent = current.sink.send(body) => sent,
        };
        drop(writer);

        match sent {
            Ok(()) => Ok(()),
            Err(e) if session.is_ended() => {
                tracing::debug!(error = %e, "Session ended during write");
                Err(Error::ConnectionClosed)
            }
            Err(e) => {
                tracing::error!(error = %e, "Write failed");
                self.connection.fail_session(session.generation(), e.clone()).await;
                Err(e)
            }
        }
    }

    fn finish<T>(&self, method: &str, start: Instant, result: &Result<T>) {
        let duration = start.elapsed().as_secs_f64();
        match result {
            Ok(_) => {
                self.keepalive.completed();
                if let Some(m) = &self.metrics {
                    m.record_request(method, "success", duration);
                }
                tracing::debug!(duration_secs = duration, "Request completed successfully");
            }
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.record_request(method, "error", duration);
                    m.record_error(e);
                }
                tracing::warn!(error = %e, "Request failed");
            }
        }
    }

    async fn read_loop(self, mut reader: FrameReader, session: Session) {
        let generation = session.generation();

        let reason = loop {
            tokio::select! {
                _ = session.token().cancelled() => {
                    break session.reason().unwrap_or(Error::ConnectionClosed);
                }
                frame = reader.next() => {
                    match frame {
                        Some(Ok(body)) => {
                            if codec::is_blank(&body) {
                                continue;
                            }
                            match codec::decode(&body) {
                                Ok(message) => self.handle_message(message).await,
                                Err(e) => {
                                    tracing::error!(error = %e, "Malformed frame, dropping connection");
                                    break e;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Transport error");
                            break e;
                        }
                        None => {
                            tracing::info!("Connection closed by server");
                            break Error::ConnectionClosed;
                        }
                    }
                }
            }
        };

        drop(reader);
        self.handle_disconnect(generation, reason).await;
    }

    async fn handle_message(&self, message: Message) {
        match message {
            Message::Response(response) => {
                let id = response.id;
                if !self.request_manager.complete(response).await {
                    tracing::warn!(?id, "Response for unknown request dropped");
                }
            }
            Message::Batch(items) => {
                tracing::debug!(batch_size = items.len(), "Batch response received");
                if !self.request_manager.complete_batch(items).await {
                    tracing::warn!("Batch response for unknown request dropped");
                }
            }
            Message::Notification(notification) => {
                if let Some(m) = &self.metrics {
                    m.record_notification(&notification.method);
                }
                tracing::debug!(method = %notification.method, "Notification received");
                self.router.dispatch(notification).await;
            }
            Message::Unroutable(value) => {
                tracing::warn!(message = %value, "Unroutable message dropped");
            }
        }
    }

    async fn handle_disconnect(&self, generation: u64, reason: Error) {
        self.drop_writer(generation).await;

        if !self.connection.disconnected(generation).await {
            // Closed by the caller, or an older session
            tracing::debug!(generation, "Session ended");
            return;
        }

        tracing::warn!(generation, error = %reason, "Connection lost");
        self.record_state(ConnectionState::Disconnected);
        self.record_error(&reason);

        let failed = self.request_manager.fail_all(Error::ConnectionClosed).await;
        if failed > 0 {
            tracing::debug!(failed, "Pending requests failed");
        }
        for topic in &self.config.teardown_topics {
            self.router.remove_all(topic).await;
        }

        self.schedule_reconnect();
    }

    async fn drop_writer(&self, generation: u64) {
        let mut writer = self.writer.lock().await;
        if writer.as_ref().map_or(false, |w| w.session.generation() == generation) {
            writer.take();
        }
    }

    fn schedule_reconnect(&self) {
        let client = self.clone();
        let delay = self.config.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client.reconnect().await;
        });
    }

    async fn reconnect(&self) {
        if self.connection.is_closed().await {
            tracing::debug!("Client closed, reconnect cancelled");
            return;
        }

        let decision = self.strategy.lock().await.next_attempt();
        match decision {
            ReconnectDecision::Retry { remaining } => {
                tracing::info!(?remaining, "Attempting reconnection");
                if let Some(m) = &self.metrics {
                    m.record_reconnection_attempt();
                }

                match self.open_session().await {
                    Ok(true) => {
                        if let Some(m) = &self.metrics {
                            m.record_reconnection_success();
                        }
                        match self.handshake().await {
                            Ok(()) => tracing::info!("Reconnected successfully"),
                            Err(e) => tracing::warn!(error = %e, "Handshake after reconnect failed"),
                        }
                    }
                    Ok(false) => tracing::debug!("Already connected"),
                    Err(Error::ClientClosed) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Reconnection failed");
                        self.schedule_reconnect();
                    }
                }
            }
            ReconnectDecision::Exhausted(callback) => {
                tracing::error!("Reconnection budget exhausted");
                callback();
            }
            ReconnectDecision::Stop => {
                tracing::error!("Reconnection abandoned");
            }
        }
    }

    async fn keepalive_loop(self, session: Session) {
        let method = self.config.probe_method.clone();

        let probe = || {
            let client = self.clone();
            let method = method.clone();
            async move {
                let result = client.request(method, Vec::new()).await;
                if let Some(m) = &client.metrics {
                    m.record_keepalive_probe(if result.is_ok() { "answered" } else { "failed" });
                }
                result
            }
        };
        let on_timeout = || {
            if let Some(m) = &self.metrics {
                m.record_keepalive_probe("timeout");
            }
            session.fail(Error::KeepaliveTimeout);
        };

        self.keepalive
            .run(session.token().clone(), probe, on_timeout)
            .await;
    }

    fn record_state(&self, state: ConnectionState) {
        if let Some(m) = &self.metrics {
            m.update_connection_state(state);
        }
    }

    fn record_error(&self, error: &Error) {
        if let Some(m) = &self.metrics {
            m.record_error(error);
        }
    }
}
