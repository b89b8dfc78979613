//! Error types for linerpc
//!
//! A single `Error` enum covers every failure the engine can surface. The
//! variants fall into the scopes they affect:
//!
//! - **Request-scoped**: `Rpc` (the server populated the `error` member of a
//!   response). Only the caller awaiting that id sees it.
//! - **Connection-scoped**: `Io`, `Tls`, `ConnectTimeout`, `Framing`,
//!   `KeepaliveTimeout`. These tear the session down; every pending request is
//!   then failed with `ConnectionClosed`.
//! - **Caller mistakes**: `Configuration`, `InvalidRequest`, `NotConnected`,
//!   `ClientClosed`.
//!
//! # Examples
//!
//! ```rust
//! use linerpc_core::Error;
//! use serde_json::json;
//!
//! let error = Error::Rpc(json!({"code": 1, "message": "unknown method"}));
//! assert!(error.is_rpc());
//! assert!(!error.is_connection_error());
//! ```

use thiserror::Error;

/// Result type for linerpc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for linerpc operations
///
/// The enum is `Clone` so a single connection-loss reason can be handed to
/// every pending request.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The server answered with a populated `error` member
    ///
    /// The payload is kept verbatim: servers of this protocol family do not
    /// agree on the shape of error objects.
    #[error("RPC error: {0}")]
    Rpc(serde_json::Value),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A received frame is not valid JSON
    ///
    /// Fatal for the connection it arrived on.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Socket-level input/output error
    #[error("IO error: {0}")]
    Io(String),

    /// TLS negotiation or certificate error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid configuration (for example an unknown transport protocol)
    ///
    /// Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed call (for example an empty batch)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A request was attempted while the connection is not established
    #[error("Connection to server lost, please retry")]
    NotConnected,

    /// The connection went away while the request was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// The transport did not connect within the configured timeout
    #[error("Connect timeout")]
    ConnectTimeout,

    /// The liveness probe did not get an answer in time
    #[error("Keepalive ping timeout")]
    KeepaliveTimeout,

    /// The client was closed explicitly and cannot be reused
    #[error("Client closed")]
    ClientClosed,

    /// Unexpected internal condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors reported by the server for a single request
    pub fn is_rpc(&self) -> bool {
        matches!(self, Error::Rpc(_))
    }

    /// True for errors that take the whole connection down
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Tls(_)
                | Error::Framing(_)
                | Error::ConnectTimeout
                | Error::KeepaliveTimeout
                | Error::ConnectionClosed
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
