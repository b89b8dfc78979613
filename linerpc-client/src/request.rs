//! Request correlation for the line-delimited JSON-RPC client
//!
//! This module owns the id counter and the table of outstanding requests.
//!
//! # Request Lifecycle
//!
//! 1. **Allocate**: take the next id (or a block of consecutive ids for a batch)
//! 2. **Register**: park a oneshot sender under the id
//! 3. **Send**: the client writes the frame to the transport
//! 4. **Complete**: a response with a matching id resolves the sender
//! 5. **Fail**: connection loss rejects everything still parked
//!
//! # Batches
//!
//! A batch occupies a single slot keyed by its *last* id, together with the
//! ordered `id -> param` mapping. A response array resolves the batch as soon
//! as one of its entries carries that id; the whole array is handed over.
//! A partial array that lacks the last id never resolves the batch. Only
//! `fail_all` releases it.

use crate::batch::{BatchParams, BatchResponse};
use linerpc_core::{Error, Id, Outcome, Response, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Receiver for a single request
pub type ResponseReceiver = oneshot::Receiver<Result<Value>>;

/// Receiver for a batch request
pub type BatchReceiver = oneshot::Receiver<Result<BatchResponse>>;

enum PendingEntry {
    Single(oneshot::Sender<Result<Value>>),
    Batch {
        params: BatchParams,
        tx: oneshot::Sender<Result<BatchResponse>>,
    },
}

impl PendingEntry {
    fn fail(self, error: Error) {
        match self {
            PendingEntry::Single(tx) => {
                let _ = tx.send(Err(error));
            }
            PendingEntry::Batch { tx, .. } => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

/// Manager for tracking pending requests
#[derive(Clone)]
pub struct RequestManager {
    pending: Arc<Mutex<HashMap<Id, PendingEntry>>>,
    counter: Arc<AtomicU64>,
}

impl RequestManager {
    /// Create a new request manager; the first id handed out is 1
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> Id {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Allocate `count` consecutive ids and return the first one
    pub fn next_ids(&self, count: usize) -> Id {
        self.counter.fetch_add(count as u64, Ordering::SeqCst) + 1
    }

    /// Register a pending single request
    pub async fn register(&self, id: Id) -> ResponseReceiver {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, PendingEntry::Single(tx));
        rx
    }

    /// Register a pending batch under the last id of `params`
    ///
    /// Returns the id the batch is tracked under together with its receiver.
    pub async fn register_batch(&self, params: BatchParams) -> Result<(Id, BatchReceiver)> {
        let last_id = *params
            .keys()
            .next_back()
            .ok_or_else(|| Error::InvalidRequest("Batch cannot be empty".to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(last_id, PendingEntry::Batch { params, tx });
        Ok((last_id, rx))
    }

    /// Drop a registration without resolving it (e.g. the write failed)
    pub async fn cancel(&self, id: Id) -> bool {
        self.pending.lock().await.remove(&id).is_some()
    }

    /// Route a single response to its pending entry
    ///
    /// Returns `false` when nothing was waiting for the id.
    pub async fn complete(&self, response: Response) -> bool {
        let Some(id) = response.id else {
            return false;
        };
        let Some(entry) = self.pending.lock().await.remove(&id) else {
            return false;
        };

        match entry {
            PendingEntry::Single(tx) => {
                let _ = tx.send(response.into_result());
            }
            PendingEntry::Batch { params, tx } => {
                // A scalar answer to a batch slot: the server rejected the batch
                // as a whole or answered it with an array result.
                let outcome = match response.outcome {
                    Outcome::Error(error) => Err(Error::Rpc(error)),
                    Outcome::Result(Value::Array(items)) => Ok(BatchResponse::new(items, params)),
                    Outcome::Result(other) => Err(Error::Internal(format!(
                        "Batch {} answered with a non-array result: {}",
                        id, other
                    ))),
                };
                let _ = tx.send(outcome);
            }
        }
        true
    }

    /// Route a response array to the pending batch it answers
    ///
    /// The array is scanned for the first entry whose id names a registered
    /// batch slot. Returns `false` when no entry matches.
    pub async fn complete_batch(&self, items: Vec<Value>) -> bool {
        let mut pending = self.pending.lock().await;

        let matched = items
            .iter()
            .filter_map(|item| item.get("id").and_then(Value::as_u64))
            .find(|id| matches!(pending.get(id), Some(PendingEntry::Batch { .. })));

        let Some(id) = matched else {
            return false;
        };
        if let Some(PendingEntry::Batch { params, tx }) = pending.remove(&id) {
            drop(pending);
            let _ = tx.send(Ok(BatchResponse::new(items, params)));
        }
        true
    }

    /// Fail every pending request and batch, then clear the table
    pub async fn fail_all(&self, error: Error) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        for (_, entry) in pending.drain() {
            entry.fail(error.clone());
        }
        count
    }

    /// Get the number of pending entries (a batch counts once)
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Check whether an id is still outstanding
    pub async fn is_pending(&self, id: Id) -> bool {
        self.pending.lock().await.contains_key(&id)
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ids_are_monotonic_from_one() {
        let manager = RequestManager::new();

        assert_eq!(manager.next_id(), 1);
        assert_eq!(manager.next_id(), 2);
        assert_eq!(manager.next_ids(3), 3);
        assert_eq!(manager.next_id(), 6);
    }

    #[tokio::test]
    async fn test_register_and_complete() {
        let manager = RequestManager::new();
        let id = manager.next_id();

        let rx = manager.register(id).await;
        assert_eq!(manager.pending_count().await, 1);

        assert!(manager.complete(Response::success(id, json!(42))).await);
        assert_eq!(manager.pending_count().await, 0);

        assert_eq!(rx.await.unwrap().unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_error_response_rejects_only_that_request() {
        let manager = RequestManager::new();
        let rx1 = manager.register(1).await;
        let rx2 = manager.register(2).await;

        manager.complete(Response::failure(1, json!({"message": "bad"}))).await;

        assert!(rx1.await.unwrap().unwrap_err().is_rpc());
        assert!(manager.is_pending(2).await);

        manager.complete(Response::success(2, json!("ok"))).await;
        assert_eq!(rx2.await.unwrap().unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_routed() {
        let manager = RequestManager::new();
        assert!(!manager.complete(Response::success(99, json!(null))).await);

        let no_id = Response::from_value(json!({"id": "x", "result": 1}));
        assert!(!manager.complete(no_id).await);
    }

    #[tokio::test]
    async fn test_out_of_order_completion() {
        let manager = RequestManager::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let id = manager.next_id();
            receivers.push((id, manager.register(id).await));
        }

        for id in [4, 1, 5, 3, 2] {
            assert!(manager.complete(Response::success(id, json!(id * 10))).await);
        }

        for (id, rx) in receivers {
            assert_eq!(rx.await.unwrap().unwrap(), json!(id * 10));
        }
    }

    #[tokio::test]
    async fn test_batch_registered_under_last_id() {
        let manager = RequestManager::new();
        let first = manager.next_ids(3);
        let params: BatchParams = [(first, json!("a")), (first + 1, json!("b")), (first + 2, json!("c"))]
            .into_iter()
            .collect();

        let (slot, rx) = manager.register_batch(params).await.unwrap();
        assert_eq!(slot, first + 2);
        assert!(!manager.is_pending(first).await);
        assert!(manager.is_pending(first + 2).await);

        let items = vec![
            json!({"id": first, "result": 1}),
            json!({"id": first + 1, "result": 2}),
            json!({"id": first + 2, "result": 3}),
        ];
        assert!(manager.complete_batch(items.clone()).await);

        let batch = rx.await.unwrap().unwrap();
        assert_eq!(batch.raw(), &items[..]);
        assert_eq!(batch.params().get(&first), Some(&json!("a")));
        assert_eq!(batch.params().get(&(first + 2)), Some(&json!("c")));
    }

    #[tokio::test]
    async fn test_partial_batch_without_last_id_stays_pending() {
        let manager = RequestManager::new();
        let params: BatchParams = [(1, json!("a")), (2, json!("b"))].into_iter().collect();
        let (_, mut rx) = manager.register_batch(params).await.unwrap();

        assert!(!manager.complete_batch(vec![json!({"id": 1, "result": 1})]).await);
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.pending_count().await, 1);

        manager.fail_all(Error::ConnectionClosed).await;
        assert!(matches!(rx.await.unwrap(), Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_batch_rejected_as_a_whole() {
        let manager = RequestManager::new();
        let params: BatchParams = [(1, json!("a"))].into_iter().collect();
        let (slot, rx) = manager.register_batch(params).await.unwrap();

        manager.complete(Response::failure(slot, json!("batch too large"))).await;
        assert!(rx.await.unwrap().unwrap_err().is_rpc());
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let manager = RequestManager::new();
        let result = manager.register_batch(BatchParams::new()).await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let manager = RequestManager::new();

        let rx1 = manager.register(1).await;
        let rx2 = manager.register(2).await;
        let (_, rx3) = manager
            .register_batch([(3, json!("x"))].into_iter().collect())
            .await
            .unwrap();

        assert_eq!(manager.pending_count().await, 3);
        assert_eq!(manager.fail_all(Error::ConnectionClosed).await, 3);

        assert_eq!(manager.pending_count().await, 0);
        assert!(rx1.await.unwrap().is_err());
        assert!(rx2.await.unwrap().is_err());
        assert!(rx3.await.unwrap().is_err());
    }
}
