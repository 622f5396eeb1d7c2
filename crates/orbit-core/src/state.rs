//! Observable connection state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the notification socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no pending attempt.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Socket is open.
    Connected,
    /// Waiting for the backoff delay before the next attempt.
    Reconnecting,
    /// Reconnect attempts exhausted; only an explicit connect resumes.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot published by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub attempts: u32,
    /// Last connection error, cleared on successful (re)connection.
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
