//! Core types, framing and codec for line-delimited JSON-RPC
//!
//! This crate holds the transport-agnostic half of linerpc:
//!
//! - **Types**: outbound [`Request`]s and the inbound [`Message`] shapes
//!   (single response, batch response, notification)
//! - **Codec**: newline framing ([`codec::FrameDecoder`],
//!   [`codec::LineCodec`]) and JSON encoding/decoding
//! - **Error handling**: the [`Error`] taxonomy shared by every crate
//! - **Observability**: `tracing` subscriber and OpenTelemetry setup
//!
//! The `linerpc-client` crate builds the persistent TCP/TLS client on top.
//!
//! # Example
//!
//! ```rust
//! use linerpc_core::{codec, Message, Request};
//!
//! let request = Request::new("server.version", vec!["wallet".into(), "1.4".into()], 1);
//! let body = codec::encode_request(&request).unwrap();
//! assert!(body.contains("\"method\":\"server.version\""));
//!
//! let message = codec::decode(br#"{"id":1,"result":["ElectrumX 1.16","1.4"]}"#).unwrap();
//! assert!(matches!(message, Message::Response(_)));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{Id, Message, Notification, Outcome, Request, Response};
