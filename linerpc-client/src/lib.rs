//! Persistent line-delimited JSON-RPC client over TCP and TLS
//!
//! This crate provides a long-lived JSON-RPC client for servers speaking one
//! JSON value per line, such as Electrum servers. It keeps a single
//! connection alive, multiplexes concurrent requests over it and recovers
//! from connection loss on its own.
//!
//! # Core Features
//!
//! - **TCP/TLS Transport**: `tcp`, `tls` and `ssl` protocols, or any custom
//!   [`Connector`]
//! - **Request-Response**: concurrent requests correlated by id, in any order
//! - **Batch Requests**: one method over many parameters in a single frame
//! - **Notifications**: per-topic listeners and channels
//! - **Keepalive**: idle connections are probed and dropped when silent
//! - **Auto-Reconnection**: fixed delay, handshake replay and a retry budget
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use linerpc_client::ClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("electrum.example.org", 50002)
//!         .protocol("tls")
//!         .handshake("wallet", "1.4")
//!         .connect()
//!         .await?;
//!
//!     let tip = client.blockchain_headers_subscribe().await?;
//!     println!("Tip: {}", tip);
//!
//!     client
//!         .on_notification("blockchain.headers.subscribe", |params| {
//!             println!("New header: {}", params);
//!         })
//!         .await;
//!
//!     let balances = client
//!         .blockchain_scripthash_get_balance_batch(["8b01df4e...", "f3ad1c0b..."])
//!         .await?;
//!     for (scripthash, balance) in balances.results() {
//!         println!("{}: {:?}", scripthash, balance);
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # With a Retry Budget
//!
//! ```rust,no_run
//! use linerpc_client::{ClientBuilder, PersistencePolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> linerpc_core::Result<()> {
//! let client = ClientBuilder::new("127.0.0.1", 50001)
//!     .persistence(PersistencePolicy::new(10).with_callback(|| eprintln!("server gone")))
//!     .reconnect_delay(Duration::from_secs(2))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
mod client_builder;
mod config;
mod connection_state;
mod keepalive;
mod metrics;
mod methods;
mod notification;
mod reconnect;
mod request;
mod transport;

pub use batch::{BatchEntry, BatchParams, BatchResponse};
pub use client::LineRpcClient;
pub use client_builder::ClientBuilder;
pub use config::{
    ClientConfig, HandshakeConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HANDSHAKE_METHOD, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_PROBE_METHOD, DEFAULT_PROBE_TIMEOUT, DEFAULT_RECONNECT_DELAY,
};
pub use connection_state::{ConnectionManager, ConnectionState, Session};
pub use keepalive::Keepalive;
pub use metrics::ClientMetrics;
pub use methods::SUBSCRIPTION_TOPICS;
pub use notification::{Listener, ListenerId, NotificationRouter};
pub use reconnect::{
    ExhaustedCallback, NoReconnect, PersistencePolicy, ReconnectDecision, ReconnectionStrategy, RetryBudget,
};
pub use request::RequestManager;
pub use transport::{default_tls_config, AsyncStream, BoxedStream, Connector, Protocol, SocketConnector};
