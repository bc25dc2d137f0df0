//! Error types for bellite
//!
//! A single `Error` enum covers every failure a caller can observe:
//!
//! - **Application errors**: the host answered with an `error` member, or with
//!   a status array whose first slot is set (`Rpc`)
//! - **Transport errors**: the socket is gone or never existed (`NotConnected`,
//!   `ConnectionClosed`, `Io`, `Timeout`)
//! - **Caller misuse**: arguments rejected before any I/O (`InvalidArguments`)
//! - **Local failures**: encoding problems and failing listeners
//!
//! Malformed frames from the peer are never turned into an `Error` that reaches
//! caller code; the dispatcher drops them.
//!
//! # Examples
//!
//! ```rust
//! use bellite_core::Error;
//! use serde_json::json;
//!
//! let error = Error::Rpc(json!({"code": 401, "message": "Unauthorized"}));
//! assert_eq!(error.rpc_code(), Some(401));
//! assert!(error.to_string().contains("Unauthorized"));
//! ```

use serde_json::Value;
use thiserror::Error;

/// Result type for bellite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bellite operations
///
/// `Clone` is required because a settled promise hands its error to every
/// continuation attached to it, including ones attached after settlement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Error reported by the remote host
    ///
    /// Holds the raw `error` member of the reply, or the whole `result` when
    /// the host used a failing status array (`[<error>, ...]`).
    #[error("RPC error: {0}")]
    Rpc(Value),

    /// A request was issued while no transport was attached
    #[error("Bellite client not connected")]
    NotConnected,

    /// The connection closed before the reply arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// Arguments rejected at the call site, before anything was sent
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Socket-level failure
    #[error("IO error: {0}")]
    Io(String),

    /// An operation did not complete within its deadline
    #[error("Operation timed out")]
    Timeout,

    /// An event listener failed
    #[error("Listener error: {0}")]
    Listener(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric `code` of an object-shaped RPC error, if there is one
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Error::Rpc(value) => value.get("code").and_then(Value::as_i64),
            _ => None,
        }
    }

    /// True for errors caused by the transport rather than the host
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::ConnectionClosed | Error::Io(_) | Error::Timeout
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(err.to_string()),
        }
    }
}
