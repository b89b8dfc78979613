//! Transport selection and socket setup
//!
//! The client talks to a [`Connector`], which produces a fresh byte stream on
//! every connect. [`SocketConnector`] is the production implementation: plain
//! TCP, or TCP wrapped in TLS for the `tls` and `ssl` protocols (the two are
//! aliases). Tests and embedders can plug in any other stream source.

use async_trait::async_trait;
use linerpc_core::{Error, Result};
use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    /// Plain TCP
    Tcp,
    /// TCP wrapped in TLS (`tls` or `ssl`)
    Tls,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "tls" | "ssl" => Ok(Protocol::Tls),
            other => Err(Error::Configuration(format!("unknown protocol: {}", other))),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Tls => f.write_str("tls"),
        }
    }
}

/// Byte stream the client reads frames from and writes frames to
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed transport stream
pub type BoxedStream = Box<dyn AsyncStream>;

/// Source of transport streams
///
/// Called once per connect attempt, including automatic reconnects.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new stream to the server
    async fn connect(&self) -> Result<BoxedStream>;

    /// Human-readable target used in logs
    fn target(&self) -> String {
        "custom".to_string()
    }
}

/// TCP/TLS connector
pub struct SocketConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    tls: Option<TlsConnector>,
}

impl SocketConnector {
    /// Create a connector for `host:port`
    ///
    /// TLS connections verify the server against the bundled web PKI roots.
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol, connect_timeout: Duration) -> Result<Self> {
        let tls = match protocol {
            Protocol::Tcp => None,
            Protocol::Tls => Some(TlsConnector::from(Arc::new(default_tls_config()?))),
        };

        Ok(Self {
            host: host.into(),
            port,
            connect_timeout,
            tls,
        })
    }

    /// Replace the TLS configuration (e.g. to trust a self-signed server)
    ///
    /// Switches the connector to TLS when it was plain TCP.
    pub fn with_tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(TlsConnector::from(config));
        self
    }

    /// Check whether the connector wraps the socket in TLS
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    async fn open_tcp(&self) -> Result<TcpStream> {
        let mut last_error = None;

        for addr in lookup_host((self.host.as_str(), self.port)).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(true)?;
            socket.set_nodelay(true)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    debug!(%addr, "TCP connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "TCP connect failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => Error::Io(format!("no addresses resolved for {}", self.host)),
        })
    }

    async fn open(&self) -> Result<BoxedStream> {
        let tcp = self.open_tcp().await?;

        match &self.tls {
            None => Ok(Box::new(tcp) as BoxedStream),
            Some(tls) => {
                let server_name = ServerName::try_from(self.host.clone())
                    .map_err(|e| Error::Tls(format!("invalid server name {}: {}", self.host, e)))?;
                let stream = tls
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| Error::Tls(e.to_string()))?;
                Ok(Box::new(stream) as BoxedStream)
            }
        }
    }
}

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self) -> Result<BoxedStream> {
        // The timeout only covers establishing the stream.
        tokio::time::timeout(self.connect_timeout, self.open())
            .await
            .map_err(|_| Error::ConnectTimeout)?
    }

    fn target(&self) -> String {
        let scheme = if self.is_tls() { "tls" } else { "tcp" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// TLS configuration trusting the bundled web PKI roots
pub fn default_tls_config() -> Result<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}
