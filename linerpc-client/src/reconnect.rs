//! Reconnection strategies for automatic reconnection
//!
//! When the connection drops without the caller asking for it, the client
//! waits a fixed delay and then consults its strategy, which decides between:
//!
//! - **Retry**: run connect and the handshake again
//! - **Exhausted**: give up and hand control to the caller's callback
//! - **Stop**: give up silently
//!
//! # Built-in Strategies
//!
//! - **RetryBudget**: the persistence policy. A positive budget is spent one
//!   attempt at a time; once it is gone the callback fires (or, without a
//!   callback, retrying stops). Without any policy it retries forever.
//! - **NoReconnect**: never reconnect
//!
//! The budget is a lifetime budget: a successful reconnect does not refill it.
//!
//! # Examples
//!
//! ```rust
//! use linerpc_client::{PersistencePolicy, ReconnectDecision, ReconnectionStrategy, RetryBudget};
//!
//! let mut budget = RetryBudget::new(Some(PersistencePolicy::new(2)));
//! assert!(matches!(budget.next_attempt(), ReconnectDecision::Retry { .. }));
//! assert!(matches!(budget.next_attempt(), ReconnectDecision::Retry { .. }));
//! assert!(matches!(budget.next_attempt(), ReconnectDecision::Stop));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Callback invoked once the retry budget is spent
pub type ExhaustedCallback = Arc<dyn Fn() + Send + Sync>;

/// Persistence policy: how many automatic reconnects to attempt
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PersistencePolicy {
    /// Remaining automatic reconnect attempts
    pub max_retry: u32,
    /// Invoked instead of retrying once `max_retry` reaches zero
    #[serde(skip)]
    pub callback: Option<ExhaustedCallback>,
}

impl PersistencePolicy {
    /// Create a policy with a retry budget and no callback
    pub fn new(max_retry: u32) -> Self {
        Self {
            max_retry,
            callback: None,
        }
    }

    /// Set the callback invoked when the budget is spent
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for PersistencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistencePolicy")
            .field("max_retry", &self.max_retry)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Outcome of consulting a strategy after an unexpected disconnect
#[derive(Clone)]
pub enum ReconnectDecision {
    /// Reconnect now; `remaining` is the budget left after this attempt
    /// (`None` for unlimited)
    Retry { remaining: Option<u32> },
    /// Budget spent; invoke the callback and stop
    Exhausted(ExhaustedCallback),
    /// Stop reconnecting
    Stop,
}

impl fmt::Debug for ReconnectDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectDecision::Retry { remaining } => {
                f.debug_struct("Retry").field("remaining", remaining).finish()
            }
            ReconnectDecision::Exhausted(_) => f.write_str("Exhausted"),
            ReconnectDecision::Stop => f.write_str("Stop"),
        }
    }
}

/// Trait for reconnection strategies
///
/// The strategy is consulted once per scheduled reconnect, after the delay
/// has elapsed. A failed attempt schedules another consultation.
pub trait ReconnectionStrategy: Send + Sync {
    /// Decide what to do about the next reconnect
    fn next_attempt(&mut self) -> ReconnectDecision;
}

/// Strategy driven by an optional [`PersistencePolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryBudget {
    policy: Option<PersistencePolicy>,
}

impl RetryBudget {
    /// Create a strategy from a policy; `None` retries unconditionally
    pub fn new(policy: Option<PersistencePolicy>) -> Self {
        Self { policy }
    }

    /// Strategy that retries forever
    pub fn unconditional() -> Self {
        Self { policy: None }
    }
}

impl ReconnectionStrategy for RetryBudget {
    fn next_attempt(&mut self) -> ReconnectDecision {
        let Some(policy) = self.policy.as_mut() else {
            return ReconnectDecision::Retry { remaining: None };
        };

        if policy.max_retry > 0 {
            policy.max_retry -= 1;
            return ReconnectDecision::Retry {
                remaining: Some(policy.max_retry),
            };
        }

        match &policy.callback {
            Some(callback) => ReconnectDecision::Exhausted(Arc::clone(callback)),
            None => ReconnectDecision::Stop,
        }
    }
}

/// Strategy that never reconnects
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_attempt(&mut self) -> ReconnectDecision {
        ReconnectDecision::Stop
    }
}
