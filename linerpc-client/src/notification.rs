//! Notification routing for server-pushed messages
//!
//! Messages without an id are notifications. Their `method` names a topic and
//! their `params` are handed to every listener registered for that topic.
//! Topics nobody listens to are ignored silently.
//!
//! Listeners are plain synchronous callbacks invoked on the reader task.
//! A listener that needs to do async work should forward the payload to a
//! channel; [`NotificationRouter::subscribe_channel`] does exactly that.
//!
//! # Examples
//!
//! ```rust,no_run
//! use linerpc_client::LineRpcClient;
//!
//! # async fn example(client: &LineRpcClient) {
//! let id = client
//!     .on_notification("blockchain.headers.subscribe", |params| {
//!         println!("New tip: {}", params);
//!     })
//!     .await;
//!
//! let mut status = client.notifications("blockchain.scripthash.subscribe").await;
//! while let Some(params) = status.recv().await {
//!     println!("Status changed: {}", params);
//! }
//!
//! client.remove_listener(id).await;
//! # }
//! ```

use linerpc_core::Notification;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Type for notification listener functions
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of notification listeners keyed by topic
#[derive(Clone)]
pub struct NotificationRouter {
    listeners: Arc<Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>>,
    next_id: Arc<AtomicU64>,
}

impl NotificationRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a listener for a topic
    pub async fn subscribe<F>(&self, topic: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .lock()
            .await
            .entry(topic.into())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Register a listener that forwards every payload to a channel
    ///
    /// The listener stays registered after the receiver is dropped; remove it
    /// with [`remove_all`](Self::remove_all) or let connection teardown drop it.
    pub async fn subscribe_channel(&self, topic: impl Into<String>) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(topic, move |params| {
            let _ = tx.send(params);
        })
        .await;
        rx
    }

    /// Remove a single listener
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().await;
        let mut removed = false;
        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Remove every listener of a topic, returning how many were dropped
    pub async fn remove_all(&self, topic: &str) -> usize {
        self.listeners
            .lock()
            .await
            .remove(topic)
            .map_or(0, |entries| entries.len())
    }

    /// Hand a notification to every listener of its topic
    ///
    /// Returns the number of listeners invoked.
    pub async fn dispatch(&self, notification: Notification) -> usize {
        let targets: Vec<Listener> = {
            let listeners = self.listeners.lock().await;
            match listeners.get(&notification.method) {
                Some(entries) => entries.iter().map(|(_, listener)| Arc::clone(listener)).collect(),
                None => return 0,
            }
        };

        // The lock is released before calling out.
        for listener in &targets {
            listener(notification.params.clone());
        }
        targets.len()
    }

    /// Check if a topic has listeners
    pub async fn has_listeners(&self, topic: &str) -> bool {
        self.listeners.lock().await.contains_key(topic)
    }

    /// Number of listeners for a topic
    pub async fn listener_count(&self, topic: &str) -> usize {
        self.listeners
            .lock()
            .await
            .get(topic)
            .map_or(0, |entries| entries.len())
    }

    /// Get all topics with at least one listener
    pub async fn topics(&self) -> Vec<String> {
        self.listeners.lock().await.keys().cloned().collect()
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}
