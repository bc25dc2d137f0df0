//! Session state of a client
//!
//! # Session States
//!
//! - **Disconnected**: no transport attached yet
//! - **Connecting**: transport up, `connect` being announced
//! - **Authenticating**: `auth` sent, waiting for the host's answer
//! - **Ready**: authenticated
//! - **Closed**: transport gone, or the host refused the token
//!
//! # State Transitions
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Ready
//!                                   ↓            ↓
//!                                 Closed ←───────┘
//! ```
//!
//! A refused token moves the session to `Closed` without tearing down the
//! socket; the host is expected to hang up. There is no way back from
//! `Closed`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    /// True once a session has been started, whatever became of it
    pub fn has_started(self) -> bool {
        self != SessionState::Disconnected
    }

    /// Gauge value reported through `ClientMetrics`
    pub(crate) fn metric_value(self) -> i64 {
        match self {
            SessionState::Disconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Authenticating => 2,
            SessionState::Ready => 3,
            SessionState::Closed => 4,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
