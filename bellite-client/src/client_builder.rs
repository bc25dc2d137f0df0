//! Client builder
//!
//! The `ClientBuilder` gathers everything a client needs before it connects:
//! - where the host is (explicit credentials or `BELLITE_SERVER`)
//! - transport and reactor timeouts
//! - traffic logging and the unhandled-error reporter
//! - listeners that must see the `connect` event
//! - observability (OpenTelemetry) and the service name it reports
//!
//! # Examples
//!
//! ```rust,no_run
//! use bellite_client::{BelliteApi, ClientBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> bellite_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .with_credentials("127.0.0.1:3099/bellite-demo-host")
//!     .log_traffic(true)
//!     .on("ready", |client, _| {
//!         client.ping();
//!         Ok(())
//!     })
//!     .connect()
//!     .await?;
//!
//! client.run(Duration::from_millis(500)).await;
//! # Ok(())
//! # }
//! ```

use crate::client::{Bellite, ClientConfig};
use crate::credentials::Credentials;
use crate::metrics::ClientMetrics;
use crate::transport::TransportTimeouts;
use bellite_core::{Error, ErrorReporter, Listener, ObservabilityConfig, Result};
use serde_json::Value;
use std::rc::Rc;
use std::time::Duration;

/// Builder for configuring and creating a [`Bellite`] client
pub struct ClientBuilder {
    credentials: Option<String>,
    timeouts: TransportTimeouts,
    poll_timeout: Duration,
    log_traffic: bool,
    reporter: Option<ErrorReporter>,
    listeners: Vec<(String, Listener<Bellite>)>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// A builder that reads credentials from `BELLITE_SERVER` at connect time
    pub fn new() -> Self {
        Self {
            credentials: None,
            timeouts: TransportTimeouts::default(),
            poll_timeout: ClientConfig::default().poll_timeout,
            log_traffic: false,
            reporter: None,
            listeners: Vec::new(),
            observability_config: None,
            service_name: None,
        }
    }

    /// Use `host:port/token` instead of the environment
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send = timeout;
        self
    }

    /// How long one reactor tick waits for inbound bytes
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Log every frame as `send ==> ...` / `recv <== ...`
    pub fn log_traffic(mut self, enable: bool) -> Self {
        self.log_traffic = enable;
        self
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Register a listener before connecting
    ///
    /// Listeners registered here are the only ones that can observe
    /// `connect`, which fires while `connect()` is running.
    pub fn on<F>(mut self, key: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&Bellite, &[Value]) -> Result<()> + 'static,
    {
        let listener: Listener<Bellite> = Rc::new(listener);
        self.listeners.push((key.into(), listener));
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            log_traffic: self.log_traffic,
            timeouts: self.timeouts,
            poll_timeout: self.poll_timeout,
            reporter: self.reporter.clone().unwrap_or_default(),
        }
    }

    /// Build a client without connecting it
    pub fn build(self) -> Result<Bellite> {
        let metrics = match self.observability_config.clone() {
            Some(mut config) => {
                if let Some(name) = &self.service_name {
                    config.service_name = name.clone();
                }
                bellite_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {e}"))
                })?;
                Some(Rc::new(ClientMetrics::new(config.service_name)))
            }
            None => None,
        };

        let client = Bellite::with_metrics(self.client_config(), metrics);
        for (key, listener) in self.listeners {
            client.events().subscribe_listener(key, listener);
        }
        Ok(client)
    }

    /// Build the client and connect it to the host
    ///
    /// Malformed credentials are not an error: the client is returned
    /// disconnected and its ready promise is rejected with
    /// [`Error::NotConnected`]. A host that cannot be reached is an error.
    pub async fn connect(self) -> Result<Bellite> {
        let credentials = Credentials::find(self.credentials.as_deref());
        let client = self.build()?;

        match credentials {
            Some(credentials) => {
                client.connect(&credentials).await?;
            }
            None => {
                tracing::warn!("Malformed Bellite credentials, not connecting");
                client.abandon(Error::NotConnected);
            }
        }
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
