//! Wire types for the Bellite JSON-RPC 2.0 dialect
//!
//! Outgoing traffic is always a [`Request`]: a call when it carries an `id`,
//! a notification when it does not. Incoming traffic is decoded into a
//! [`Message`], a tagged variant that tells calls (including server pushed
//! `event` notifications) apart from replies.
//!
//! # Field order
//!
//! `Request` serializes its fields as `jsonrpc`, `id`, `method`, `params`,
//! which is the order the host expects to see in its traffic logs.
//!
//! # Examples
//!
//! ```rust
//! use bellite_core::{Message, Request};
//! use serde_json::json;
//!
//! let request = Request::call(100, "auth", Some(json!(["token"])));
//! let text = serde_json::to_string(&request).unwrap();
//! assert_eq!(text, r#"{"jsonrpc":"2.0","id":100,"method":"auth","params":["token"]}"#);
//!
//! let message = Message::from_value(json!({"jsonrpc": "2.0", "id": 100, "result": [0]})).unwrap();
//! assert!(message.is_reply());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name the host uses for pushed events
pub const EVENT_METHOD: &str = "event";

/// Request identifier
///
/// Identifiers are allocated by the client, so only non-negative integers are
/// ever expected back in replies.
pub type RequestId = u64;

/// Outgoing JSON-RPC call or notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Present for calls, absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Remote method name
    pub method: String,
    /// Positional (array) or named (object) parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Create a call that expects a reply
    pub fn call(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a notification (no id, no reply)
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// True when no reply will be sent for this request
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A call initiated by the host
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Usually absent; the host pushes events as notifications
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Option<Value>,
}

impl Call {
    /// The `evtType` of an `event` push, if this call is one
    pub fn event_type(&self) -> Option<&str> {
        if self.method != EVENT_METHOD {
            return None;
        }
        self.params.as_ref()?.get("evtType")?.as_str()
    }
}

/// A reply to one of our calls
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: RequestId,
    /// `Ok(result)` or `Err(error)`; an absent result is `Ok(Value::Null)`
    pub outcome: std::result::Result<Value, Value>,
}

impl Reply {
    /// Convert the reply into the value a pending request settles with
    ///
    /// Besides the `error` member, the host signals failure with status
    /// arrays: a result shaped `[<error>, ...]` whose first slot is truthy is
    /// a failure and the whole array becomes the error payload.
    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            Err(error) => Err(Error::Rpc(error)),
            Ok(result) if has_failure_status(&result) => Err(Error::Rpc(result)),
            Ok(result) => Ok(result),
        }
    }
}

fn has_failure_status(result: &Value) -> bool {
    match result.as_array().and_then(|items| items.first()) {
        Some(status) => is_truthy(status),
        None => false,
    }
}

/// JSON truthiness: `null`, `false`, zero, and empty strings/arrays/objects
/// are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A decoded incoming message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A message with a `method` member
    Call(Call),
    /// A message without `method`, correlated by `id`
    Reply(Reply),
}

/// Loose view of an incoming object, before classification
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    /// `Some(Value::Null)` when the member is present but null
    #[serde(default, deserialize_with = "present")]
    error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    /// Classify a parsed JSON value
    ///
    /// A value with a `method` member is a call. Anything else must carry a
    /// non-negative integer `id` to be a reply; otherwise there is nothing to
    /// correlate it with and decoding fails.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::Serialization("message is not a JSON object".into()));
        }
        let envelope: Envelope = serde_json::from_value(value)?;

        if let Some(method) = envelope.method {
            return Ok(Message::Call(Call {
                id: envelope.id.as_ref().and_then(Value::as_u64),
                method,
                params: envelope.params,
            }));
        }

        let id = envelope
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Serialization("reply without a usable id".into()))?;

        // Any `error` member rejects, even a null one
        let outcome = match envelope.error {
            Some(error) => Err(error),
            None => Ok(envelope.result.unwrap_or(Value::Null)),
        };

        Ok(Message::Reply(Reply { id, outcome }))
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Message::Call(_))
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Message::Reply(_))
    }
}
