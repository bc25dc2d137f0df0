//! Core building blocks for the Bellite JSON-RPC client
//!
//! This crate holds everything that does not touch a socket:
//!
//! - **Types**: wire messages for the Bellite JSON-RPC 2.0 dialect
//! - **Codec**: NUL-delimited JSON framing
//! - **Deferred**: one-shot values with synchronous continuations
//! - **Events**: a keyed publish/subscribe channel
//! - **Error handling**: the shared error enum and the unhandled-error reporter
//! - **Observability**: `tracing` subscriber and OpenTelemetry setup
//!
//! Everything here is single-threaded. Handles are `Rc` based and
//! continuations run synchronously on the thread that settles them, so none of
//! these types are `Send`.
//!
//! # Example
//!
//! ```rust
//! use bellite_core::codec::{NulJsonCodec, RpcCodec};
//! use bellite_core::{Deferred, Message, Request};
//! use serde_json::json;
//!
//! let bytes = NulJsonCodec.encode(&Request::call(100, "ping", None)).unwrap();
//! assert_eq!(bytes.last(), Some(&0u8));
//!
//! let pending: Deferred<serde_json::Value> = Deferred::new();
//! let reply = NulJsonCodec.decode(br#"{"id":100,"result":[null,true,"pong"]}"#).unwrap();
//! if let Message::Reply(reply) = reply {
//!     pending.settle(reply.into_result());
//! }
//! assert_eq!(pending.promise().outcome(), Some(Ok(json!([null, true, "pong"]))));
//! ```

pub mod codec;
pub mod deferred;
pub mod error;
pub mod events;
pub mod observability;
pub mod report;
pub mod types;

pub use deferred::{Deferred, Promise, PromiseState};
pub use error::{Error, Result};
pub use events::{EventChannel, Listener};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use report::ErrorReporter;
pub use types::{is_truthy, Call, Message, Reply, Request, RequestId};
