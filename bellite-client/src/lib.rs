//! JSON-RPC 2.0 client for a Bellite host
//!
//! A Bellite host launches desktop applications and talks to them over a
//! local TCP socket carrying NUL-delimited JSON-RPC 2.0 messages. This crate
//! is the application side of that conversation.
//!
//! # Core Features
//!
//! - **Session sequencing**: `connect` → `auth` → `ready`, with a ready promise
//! - **Request-Response**: calls return [`Promise`](bellite_core::Promise)s
//!   settled by the matching reply
//! - **Host events**: pushed `event` notifications are emitted by `evtType`
//! - **Host methods**: `ping`, `version`, `perform`, `bindEvent` and friends
//!   through [`BelliteApi`]
//! - **Observability**: `tracing` logs, optional traffic logging, and
//!   OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bellite_client::{BelliteApi, ClientBuilder, EventBinding, PerformArgs};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from BELLITE_SERVER
//!     let client = ClientBuilder::new().connect().await?;
//!
//!     client.on("ready", |client, _| {
//!         client.ping().done(|pong| {
//!             println!("ping: {pong}");
//!             Ok(())
//!         });
//!         client.bind_event(EventBinding::new("testEvent"));
//!         client.perform(0, "testEvent", PerformArgs::new())?;
//!         Ok(())
//!     });
//!
//!     client.on("testEvent", |client, args| {
//!         println!("event: {}", json!(args));
//!         client.close();
//!         Ok(())
//!     });
//!
//!     client.run(Duration::from_millis(500)).await;
//!     Ok(())
//! }
//! ```

mod api;
mod client;
mod client_builder;
mod connection_state;
mod credentials;
mod metrics;
mod request;
mod transport;

pub use api::{BelliteApi, EventBinding, PerformArgs, RpcSession};
pub use client::{Bellite, ClientConfig, TRAFFIC_TARGET};
pub use client_builder::ClientBuilder;
pub use connection_state::SessionState;
pub use credentials::{Credentials, DEFAULT_SERVER, SERVER_ENV};
pub use metrics::ClientMetrics;
pub use request::FIRST_REQUEST_ID;
pub use transport::{Inbound, MessageTransport, TcpReceiver, TcpTransport, TransportTimeouts};
