//! Wire types for line-delimited JSON-RPC
//!
//! Every frame on the wire is one JSON value. Outbound frames are a single
//! [`Request`] or an array of them; inbound frames classify into a
//! [`Message`]:
//!
//! - **Response**: an object carrying an `id` member
//! - **Batch**: an array whose first element carries an `id`
//! - **Notification**: an object without `id`, routed by its `method`
//!
//! Anything else is kept as [`Message::Unroutable`] so the caller can log it.
//!
//! # Examples
//!
//! ```rust
//! use linerpc_core::{Message, Outcome};
//! use serde_json::json;
//!
//! let message = Message::classify(json!({"id": 3, "result": "pong"}));
//! match message {
//!     Message::Response(response) => {
//!         assert_eq!(response.id, Some(3));
//!         assert_eq!(response.outcome, Outcome::Result(json!("pong")));
//!     }
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request identifier
///
/// Ids are assigned by the client from a monotonically increasing counter and
/// are never reused while a request is outstanding.
pub type Id = u64;

/// Outbound request
///
/// Parameters are always positional. The `jsonrpc` member is sent for
/// servers that require it; servers that predate it ignore unknown members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version marker, always "2.0"
    pub jsonrpc: String,
    /// Correlation id
    pub id: Id,
    /// Remote method name
    pub method: String,
    /// Positional parameters
    pub params: Vec<Value>,
}

impl Request {
    /// Create a new request
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: Id) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Server-pushed message without an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Topic the notification belongs to
    pub method: String,
    /// Payload, `null` when the server sent none
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    /// Create a new notification
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Success or failure half of a response
///
/// Exactly one of the two is present on a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The `result` member, or the whole response object when the server
    /// omitted `result`
    Result(Value),
    /// The `error` member, verbatim
    Error(Value),
}

/// Decoded response to a single request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Correlation id; `None` when the server sent an id that is not an
    /// unsigned integer
    pub id: Option<Id>,
    /// Success or failure payload
    pub outcome: Outcome,
}

impl Response {
    /// Build a response from a JSON object that carries an `id` member
    ///
    /// A non-null `error` member wins; otherwise the `result` member is used
    /// when present (even when `null`), falling back to the whole object.
    pub fn from_value(value: Value) -> Self {
        let id = value.get("id").and_then(Value::as_u64);

        let error = value.get("error").filter(|error| !error.is_null()).cloned();
        if let Some(error) = error {
            return Self {
                id,
                outcome: Outcome::Error(error),
            };
        }

        let result = value.get("result").cloned();
        let outcome = Outcome::Result(result.unwrap_or(value));

        Self { id, outcome }
    }

    /// Convenience constructor for a successful response
    pub fn success(id: Id, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    /// Convenience constructor for a failed response
    pub fn failure(id: Id, error: Value) -> Self {
        Self {
            id: Some(id),
            outcome: Outcome::Error(error),
        }
    }

    /// Check if the response carries a result
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// Check if the response carries an error
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Convert into the value a caller awaits
    pub fn into_result(self) -> crate::Result<Value> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(crate::Error::Rpc(error)),
        }
    }
}

/// Any inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Response to a single request
    Response(Response),
    /// Response array to a batch request, kept raw so the whole array can be
    /// handed to the batch resolver
    Batch(Vec<Value>),
    /// Server-pushed notification
    Notification(Notification),
    /// Valid JSON that fits none of the shapes above
    Unroutable(Value),
}

impl Message {
    /// Classify a parsed JSON value
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                let first_has_id = items
                    .first()
                    .and_then(|first| first.get("id"))
                    .map_or(false, |id| !id.is_null());
                if first_has_id {
                    Message::Batch(items)
                } else {
                    Message::Unroutable(Value::Array(items))
                }
            }
            Value::Object(map) => {
                if map.contains_key("id") {
                    return Message::Response(Response::from_value(Value::Object(map)));
                }
                let method = map.get("method").and_then(Value::as_str).map(str::to_owned);
                match method {
                    Some(method) => {
                        let params = map.get("params").cloned().unwrap_or(Value::Null);
                        Message::Notification(Notification::new(method, params))
                    }
                    None => Message::Unroutable(Value::Object(map)),
                }
            }
            other => Message::Unroutable(other),
        }
    }

    /// Check if this message is a single response
    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    /// Check if this message is a batch response
    pub fn is_batch(&self) -> bool {
        matches!(self, Message::Batch(_))
    }

    /// Check if this message is a notification
    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Notification(_))
    }
}
