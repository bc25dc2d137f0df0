//! Bellite - JSON-RPC 2.0 client for a Bellite desktop host
//!
//! This is the convenience crate that re-exports the Bellite sub-crates.
//! Use it when a single dependency for the whole client is wanted.
//!
//! # Architecture
//!
//! - **bellite-core**: message types, the NUL-framed codec, promises, the
//!   event channel, error handling and observability
//! - **bellite-client**: the TCP session to the host with authentication,
//!   request correlation and the host API
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bellite::{BelliteApi, ClientBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads `host:port/token` from BELLITE_SERVER
//!     let client = ClientBuilder::new()
//!         .on("ready", |client, _| {
//!             client.version().done(|info| {
//!                 println!("host: {info}");
//!                 Ok(())
//!             });
//!             Ok(())
//!         })
//!         .connect()
//!         .await?;
//!
//!     client.run(Duration::from_millis(500)).await;
//!     Ok(())
//! }
//! ```

pub use bellite_client as client;
pub use bellite_core as core;

pub use bellite_client::{Bellite, BelliteApi, ClientBuilder, EventBinding, PerformArgs, SessionState};
pub use bellite_core::{Deferred, Error, Promise, Result};
