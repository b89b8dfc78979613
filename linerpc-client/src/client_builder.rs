//! Client builder for configuring transport, persistence and other options
//!
//! The `ClientBuilder` provides a fluent API for configuring client behavior
//! before connecting. It allows you to:
//! - Pick the transport protocol and timeouts
//! - Configure the handshake and the keepalive probe
//! - Set the retry budget for automatic reconnects, or replace the strategy
//! - Configure observability (OpenTelemetry)
//!
//! Subscription listeners survive a reconnect unless their topics are listed
//! with `teardown_topics`; `electrum_teardown` lists the Electrum ones.
//!
//! # Examples
//!
//! ```rust,no_run
//! use linerpc_client::{ClientBuilder, PersistencePolicy};
//!
//! # async fn example() -> linerpc_core::Result<()> {
//! // TLS with a handshake and a bounded retry budget
//! let client = ClientBuilder::new("electrum.example.org", 50002)
//!     .protocol("ssl")
//!     .handshake("wallet", "1.4")
//!     .persistence(PersistencePolicy::new(10).with_callback(|| eprintln!("giving up")))
//!     .connect()
//!     .await?;
//!
//! // With observability
//! let client2 = ClientBuilder::new("127.0.0.1", 50001)
//!     .with_default_observability()
//!     .service_name("my-wallet")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ClientConfig, HandshakeConfig};
use crate::methods::SUBSCRIPTION_TOPICS;
use crate::metrics::ClientMetrics;
use crate::reconnect::{NoReconnect, PersistencePolicy, ReconnectionStrategy, RetryBudget};
use crate::transport::{Connector, SocketConnector};
use crate::LineRpcClient;
use linerpc_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and creating a `LineRpcClient`
pub struct ClientBuilder {
    config: ClientConfig,
    protocol: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(ClientConfig::new(host, port))
    }

    /// Create a builder starting from a loaded configuration
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            protocol: None,
            connector: None,
            tls_config: None,
            reconnect_strategy: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Set the transport protocol by name (`tcp`, `tls` or `ssl`)
    ///
    /// Unknown names are reported by `build()` as a configuration error.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Send `[client, version]` as the handshake after every connect
    pub fn handshake(mut self, client: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.handshake = Some(HandshakeConfig::new(client, version));
        self
    }

    /// Use a custom handshake
    pub fn handshake_config(mut self, handshake: HandshakeConfig) -> Self {
        self.config.handshake = Some(handshake);
        self
    }

    /// Set the retry budget for automatic reconnects
    pub fn persistence(mut self, policy: PersistencePolicy) -> Self {
        self.config.persistence = Some(policy);
        self
    }

    /// Allow at most `max_retry` automatic reconnects
    pub fn max_retry(mut self, max_retry: u32) -> Self {
        let policy = self.config.persistence.take().unwrap_or_default();
        self.config.persistence = Some(PersistencePolicy { max_retry, ..policy });
        self
    }

    /// Call `callback` once the retry budget is spent
    pub fn on_retry_exhausted<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let policy = self.config.persistence.take().unwrap_or_default();
        self.config.persistence = Some(policy.with_callback(callback));
        self
    }

    /// Replace the reconnection strategy derived from the persistence policy
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self
    }

    /// Disable automatic reconnection
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_strategy = Some(Box::new(NoReconnect));
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the idle window before a keepalive probe
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Set how long a keepalive probe may take
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the method used as keepalive probe
    pub fn probe_method(mut self, method: impl Into<String>) -> Self {
        self.config.probe_method = method.into();
        self
    }

    /// Enable or disable the keepalive watchdog
    pub fn keepalive(mut self, enable: bool) -> Self {
        self.config.keepalive = enable;
        self
    }

    /// Set the delay before an automatic reconnect
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Reject inbound frames longer than `max` bytes
    pub fn max_frame_length(mut self, max: usize) -> Self {
        self.config.max_frame_length = Some(max);
        self
    }

    /// Drop the listeners of these topics whenever the connection is lost
    pub fn teardown_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.teardown_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Drop the Electrum subscription listeners whenever the connection is lost
    ///
    /// Shorthand for `teardown_topics(SUBSCRIPTION_TOPICS)`: listeners of
    /// `blockchain.headers.subscribe` and `blockchain.scripthash.subscribe`
    /// are removed, since the server forgets those subscriptions too.
    pub fn electrum_teardown(self) -> Self {
        self.teardown_topics(SUBSCRIPTION_TOPICS)
    }

    /// Use a custom stream source instead of TCP/TLS sockets
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom TLS configuration
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build an unconnected client
    pub fn build(self) -> Result<LineRpcClient> {
        let mut config = self.config;
        if let Some(protocol) = self.protocol {
            config.protocol = protocol.parse()?;
        }

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => {
                let socket = SocketConnector::new(
                    config.host.clone(),
                    config.port,
                    config.protocol,
                    config.connect_timeout,
                )?;
                match self.tls_config {
                    Some(tls) => Arc::new(socket.with_tls_config(tls)),
                    None => Arc::new(socket),
                }
            }
        };

        // Initialize observability if configured
        let metrics = if let Some(mut obs) = self.observability_config {
            if let Some(name) = self.service_name {
                obs.service_name = name;
            }

            linerpc_core::init_observability(obs.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

            Some(Arc::new(ClientMetrics::new(obs.service_name)))
        } else {
            None
        };

        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(RetryBudget::new(config.persistence.clone())));

        Ok(LineRpcClient::from_parts(config, connector, strategy, metrics))
    }

    /// Build and connect the client
    ///
    /// On failure the client is closed before the error is returned, so no
    /// background task outlives the only handle.
    pub async fn connect(self) -> Result<LineRpcClient> {
        let client = self.build()?;
        if let Err(e) = client.connect().await {
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }
}
