//! Batch response handling
//!
//! A batch sends one method with many parameters in a single frame. Every
//! element of the batch gets its own consecutive id; the ordered
//! `id -> param` mapping is kept alongside the pending slot so that each
//! entry of the response array can be annotated with the parameter that
//! produced it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use linerpc_client::LineRpcClient;
//! use serde_json::json;
//!
//! # async fn example(client: &LineRpcClient) -> linerpc_core::Result<()> {
//! let balances = client
//!     .request_batch(
//!         "blockchain.scripthash.get_balance",
//!         vec![json!("8b01df4e36..."), json!("a91f0c7d44...")],
//!         None,
//!     )
//!     .await?;
//!
//! for entry in balances.entries() {
//!     println!("{:?} -> {:?}", entry.param, entry.outcome);
//! }
//! # Ok(())
//! # }
//! ```

use linerpc_core::{Error, Id, Outcome, Response, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered mapping from request id to the parameter it carried
pub type BatchParams = BTreeMap<Id, Value>;

/// One entry of a batch response
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Id echoed by the server
    pub id: Option<Id>,
    /// Parameter the request with this id was sent with
    pub param: Option<Value>,
    /// Result or error for this entry
    pub outcome: Outcome,
}

impl BatchEntry {
    /// Check if this entry succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// Get the entry as a `Result`
    pub fn result(&self) -> Result<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(Error::Rpc(error.clone())),
        }
    }
}

/// Response array of a batch request
///
/// Holds the raw array exactly as received plus the annotated entries.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    raw: Vec<Value>,
    params: BatchParams,
    entries: Vec<BatchEntry>,
}

impl BatchResponse {
    /// Create a batch response from the received array and the id mapping
    pub fn new(raw: Vec<Value>, params: BatchParams) -> Self {
        let entries = raw
            .iter()
            .map(|item| {
                let response = Response::from_value(item.clone());
                let param = response.id.and_then(|id| params.get(&id).cloned());
                BatchEntry {
                    id: response.id,
                    param,
                    outcome: response.outcome,
                }
            })
            .collect();

        Self {
            raw,
            params,
            entries,
        }
    }

    /// The response array exactly as received
    pub fn raw(&self) -> &[Value] {
        &self.raw
    }

    /// Consume the response and return the raw array
    pub fn into_raw(self) -> Vec<Value> {
        self.raw
    }

    /// The `id -> param` mapping the batch was sent with
    pub fn params(&self) -> &BatchParams {
        &self.params
    }

    /// Entries in the order the server sent them
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Get the entry answering a specific request id
    pub fn get_by_id(&self, id: Id) -> Option<&BatchEntry> {
        self.entries.iter().find(|entry| entry.id == Some(id))
    }

    /// Get the entry answering the request sent with `param`
    pub fn get_by_param(&self, param: &Value) -> Option<&BatchEntry> {
        self.entries
            .iter()
            .find(|entry| entry.param.as_ref() == Some(param))
    }

    /// Get a typed result for the request sent with `param`
    pub fn get<R>(&self, param: &Value) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let entry = self
            .get_by_param(param)
            .ok_or_else(|| Error::Internal(format!("No response for param: {}", param)))?;

        let value = entry.result()?;
        serde_json::from_value(value.clone()).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Results in request order, paired with their parameter
    ///
    /// Requests the server did not answer are reported as internal errors.
    pub fn results(&self) -> Vec<(Value, Result<Value>)> {
        self.params
            .iter()
            .map(|(id, param)| {
                let result = match self.get_by_id(*id) {
                    Some(entry) => entry.result().cloned(),
                    None => Err(Error::Internal(format!("No response for ID: {}", id))),
                };
                (param.clone(), result)
            })
            .collect()
    }

    /// Get the number of entries in the response
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the response array is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if every entry succeeded
    pub fn all_success(&self) -> bool {
        self.entries.iter().all(BatchEntry::is_success)
    }

    /// Get the failed entries
    pub fn errors(&self) -> Vec<&BatchEntry> {
        self.entries.iter().filter(|entry| !entry.is_success()).collect()
    }
}
