//! Connection state management
//!
//! This module tracks the connection lifecycle and the session that belongs
//! to the current transport.
//!
//! # Connection States
//!
//! - **Disconnected**: Initial state, or the transport went away
//! - **Connecting**: A connect attempt is in flight
//! - **Connected**: The transport is up and requests may be sent
//! - **Closed**: Closed by the caller; terminal
//!
//! # State Transitions
//!
//! ```text
//! Disconnected → Connecting → Connected
//!       ↑             │           │
//!       └─────────────┴───────────┘
//!
//! any state ──close()──→ Closed
//! ```
//!
//! # Sessions
//!
//! Every successful connect opens a new [`Session`] with a fresh generation
//! number and cancellation token. The reader and keepalive tasks of a session
//! hold a clone of it; when they report a disconnect the generation is
//! compared first so a task of an old session never tears down a newer one.

use linerpc_core::{Error, Result};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected,
    /// Closed by the caller; never reconnects
    Closed,
}

impl ConnectionState {
    /// Numeric value reported by the connection state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Closed => 3,
        }
    }
}

/// One transport lifetime
#[derive(Debug, Clone)]
pub struct Session {
    generation: u64,
    cancel: CancellationToken,
    reason: Arc<OnceLock<Error>>,
}

impl Session {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Generation number of this session
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Token cancelled when the session ends
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// End the session with a reason; only the first reason is kept
    pub fn fail(&self, reason: Error) {
        let _ = self.reason.set(reason);
        self.cancel.cancel();
    }

    /// Reason the session ended with, if it was failed explicitly
    pub fn reason(&self) -> Option<Error> {
        self.reason.get().cloned()
    }

    /// Check whether the session has ended
    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct Inner {
    state: ConnectionState,
    generation: u64,
    session: Option<Session>,
}

/// Manages the connection state machine
pub struct ConnectionManager {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionManager {
    /// Create a new connection manager in the disconnected state
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                generation: 0,
                session: None,
            })),
        }
    }

    /// Get the current connection state
    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    /// Check if requests can be sent
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Check if the client was closed
    pub async fn is_closed(&self) -> bool {
        self.state().await == ConnectionState::Closed
    }

    /// Transition to connecting state
    ///
    /// Returns `Ok(false)` when already connected (nothing to do) and
    /// `Error::ClientClosed` once the client has been closed.
    pub async fn connecting(&self) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.state {
            ConnectionState::Closed => Err(Error::ClientClosed),
            ConnectionState::Connected => Ok(false),
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                inner.state = ConnectionState::Connecting;
                Ok(true)
            }
        }
    }

    /// Transition to connected state and open a new session
    ///
    /// Returns `None` when the client was closed while connecting.
    pub async fn connected(&self) -> Option<Session> {
        let mut inner = self.inner.write().await;
        if inner.state != ConnectionState::Connecting {
            return None;
        }

        inner.generation += 1;
        let session = Session::new(inner.generation);
        inner.state = ConnectionState::Connected;
        inner.session = Some(session.clone());
        Some(session)
    }

    /// Record a failed connect attempt
    pub async fn connect_failed(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
        }
    }

    /// Transition to disconnected state after the session of `generation` ended
    ///
    /// Returns `true` only for the current session of a client that was not
    /// closed; stale sessions and closed clients are left alone.
    pub async fn disconnected(&self, generation: u64) -> bool {
        let mut inner = self.inner.write().await;
        let current = inner
            .session
            .as_ref()
            .map_or(false, |session| session.generation == generation);
        if inner.state != ConnectionState::Connected || !current {
            return false;
        }

        inner.state = ConnectionState::Disconnected;
        if let Some(session) = inner.session.take() {
            session.token().cancel();
        }
        true
    }

    /// End the session of `generation` with a reason
    pub async fn fail_session(&self, generation: u64, reason: Error) {
        let inner = self.inner.read().await;
        if let Some(session) = inner.session.as_ref().filter(|s| s.generation == generation) {
            session.fail(reason);
        }
    }

    /// Transition to closed state
    ///
    /// Returns `false` when the client was already closed.
    pub async fn close(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state == ConnectionState::Closed {
            return false;
        }

        inner.state = ConnectionState::Closed;
        if let Some(session) = inner.session.take() {
            session.fail(Error::ClientClosed);
        }
        true
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
