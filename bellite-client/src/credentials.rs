//! Host credentials
//!
//! A Bellite host publishes where to find it and which token to present as a
//! single `host:port/token` string, normally through the `BELLITE_SERVER`
//! environment variable of the processes it launches.

use bellite_core::Error;
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the credentials string
pub const SERVER_ENV: &str = "BELLITE_SERVER";

/// Used when [`SERVER_ENV`] is unset or empty
pub const DEFAULT_SERVER: &str = "127.0.0.1:3099/bellite-demo-host";

/// Parsed `host:port/token`
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub token: String,
}

impl Credentials {
    /// Parse `host:port/token`
    ///
    /// Exactly one `/` and one `:` are accepted; the host and token must be
    /// non-empty and the port must fit in a `u16`. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (address, token) = raw.split_once('/')?;
        if token.contains('/') || token.is_empty() {
            return None;
        }
        let (host, port) = address.split_once(':')?;
        if port.contains(':') || host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;

        Some(Self {
            host: host.to_string(),
            port,
            token: token.to_string(),
        })
    }

    /// Credentials from the environment, falling back to [`DEFAULT_SERVER`]
    pub fn from_env() -> Option<Self> {
        match std::env::var(SERVER_ENV) {
            Ok(raw) if !raw.is_empty() => Self::parse(&raw),
            _ => {
                tracing::warn!(
                    fallback = DEFAULT_SERVER,
                    "{SERVER_ENV} environment variable not found, using fallback"
                );
                Self::parse(DEFAULT_SERVER)
            }
        }
    }

    /// Explicit credentials if given, the environment otherwise
    pub fn find(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Self::from_env(),
        }
    }

    /// The original `host:port/token` form
    pub fn as_server_string(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.token)
    }
}

impl FromStr for Credentials {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
            .ok_or_else(|| Error::InvalidArguments(format!("malformed credentials: {raw:?}")))
    }
}

// The token is a shared secret; keep it out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .finish()
    }
}
