//! Client configuration
//!
//! [`ClientConfig`] is plain data and can be loaded from any serde format.
//! Durations are (de)serialized as milliseconds. Every field has a default,
//! so a configuration file only needs to name what differs.
//!
//! ```rust
//! use linerpc_client::{ClientConfig, Protocol};
//! use std::time::Duration;
//!
//! let config: ClientConfig = serde_json::from_str(r#"{
//!     "host": "electrum.example.org",
//!     "port": 50002,
//!     "protocol": "ssl",
//!     "handshake": {"client": "wallet", "version": "1.4"},
//!     "persistence": {"max_retry": 10}
//! }"#).unwrap();
//!
//! assert_eq!(config.protocol, Protocol::Tls);
//! assert_eq!(config.idle_timeout, Duration::from_secs(5));
//! ```

use crate::reconnect::PersistencePolicy;
use crate::transport::Protocol;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default idle window before a keepalive probe
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default keepalive probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(9);
/// Default delay before an automatic reconnect
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Default keepalive probe method
pub const DEFAULT_PROBE_METHOD: &str = "server.ping";
/// Default handshake method
pub const DEFAULT_HANDSHAKE_METHOD: &str = "server.version";

/// Request sent once after every successful connect
///
/// The default method sends `[client, version]`; the server's answer is kept
/// and available through `LineRpcClient::server_version_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Client name announced to the server
    pub client: String,
    /// Protocol version requested from the server
    pub version: String,
    /// Method carrying the handshake
    #[serde(default = "default_handshake_method")]
    pub method: String,
}

impl HandshakeConfig {
    /// Create a handshake announcing `client` and requesting `version`
    pub fn new(client: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            version: version.into(),
            method: default_handshake_method(),
        }
    }
}

fn default_handshake_method() -> String {
    DEFAULT_HANDSHAKE_METHOD.to_string()
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Transport protocol (`tcp`, `tls` or `ssl`)
    pub protocol: Protocol,
    /// Handshake sent after every connect
    pub handshake: Option<HandshakeConfig>,
    /// Retry budget for automatic reconnects; `None` retries forever
    pub persistence: Option<PersistencePolicy>,
    /// Limit for establishing the transport
    #[serde(with = "duration_ms", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
    /// Idle window before a keepalive probe
    #[serde(with = "duration_ms", rename = "idle_timeout_ms")]
    pub idle_timeout: Duration,
    /// Time a keepalive probe may take before the connection is failed
    #[serde(with = "duration_ms", rename = "probe_timeout_ms")]
    pub probe_timeout: Duration,
    /// Delay before an automatic reconnect
    #[serde(with = "duration_ms", rename = "reconnect_delay_ms")]
    pub reconnect_delay: Duration,
    /// Method used as the keepalive probe
    pub probe_method: String,
    /// Whether the keepalive watchdog runs at all
    pub keepalive: bool,
    /// Largest accepted frame in bytes; unlimited when `None`
    pub max_frame_length: Option<usize>,
    /// Topics whose listeners are dropped when the connection is lost
    ///
    /// Empty by default. Electrum clients usually want
    /// [`SUBSCRIPTION_TOPICS`](crate::SUBSCRIPTION_TOPICS) here, see
    /// `ClientBuilder::electrum_teardown`.
    pub teardown_topics: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50001,
            protocol: Protocol::Tcp,
            handshake: None,
            persistence: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            probe_method: DEFAULT_PROBE_METHOD.to_string(),
            keepalive: true,
            max_frame_length: None,
            teardown_topics: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `host:port` with every other field defaulted
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
