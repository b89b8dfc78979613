//! linerpc - persistent line-delimited JSON-RPC over TCP and TLS
//!
//! This is the main convenience crate that re-exports the linerpc sub-crates.
//! Use this crate if you want a single dependency for the whole client.
//!
//! # Architecture
//!
//! linerpc is organized into modular crates:
//!
//! - **linerpc-core**: Core types, framing codec, error handling, observability
//! - **linerpc-client**: Persistent client with batching, notifications,
//!   keepalive, reconnection and the Electrum method catalog
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use linerpc::ClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("electrum.example.org", 50002)
//!         .protocol("ssl")
//!         .handshake("wallet", "1.4")
//!         .connect()
//!         .await?;
//!
//!     let fee = client.blockchain_estimatefee(6).await?;
//!     println!("Fee estimate: {}", fee);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
// This allows users to access everything through `linerpc::` prefix
pub use linerpc_client as client;
pub use linerpc_core as core;

// Convenience re-exports of the most commonly used types
pub use linerpc_client::{BatchResponse, ClientBuilder, ClientConfig, ConnectionState, LineRpcClient, PersistencePolicy};
pub use linerpc_core::{Error, Result};
