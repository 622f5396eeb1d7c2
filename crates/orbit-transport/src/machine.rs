//! Reconnect state machine.
//!
//! Pure transitions with no I/O; the connection manager performs the
//! actions each transition asks for.

use std::time::Duration;

use orbit_core::{ConnectionState, ConnectionStatus, RealtimeSettings};

use crate::link::NORMAL_CLOSURE;

/// Error text set on any abnormal closure.
pub const CONNECTION_ERROR: &str = "WebSocket connection error";

/// Error text set once reconnect attempts are exhausted.
pub const RECONNECT_EXHAUSTED: &str = "Could not reconnect to the server. Reload the page.";

/// Outcome of a connect request or a reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Open a socket now.
    Open,
    /// Nothing to do.
    Ignored,
}

/// Outcome of losing the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lost {
    /// Retry after the delay.
    Retry(Duration),
    /// Closed normally; no retry.
    Closed,
    /// Attempts exhausted; state is `Failed`.
    GaveUp,
    /// Stale event for a connection that is already gone.
    Ignored,
}

/// Connection state, attempt counter and last error.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    last_error: Option<String>,
}

impl ConnectionMachine {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts,
            base_delay,
            last_error: None,
        }
    }

    #[must_use]
    pub const fn from_settings(settings: &RealtimeSettings) -> Self {
        Self::new(
            settings.max_reconnect_attempts,
            settings.reconnect_base_delay(),
        )
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        }
    }

    /// Explicit connect request.
    ///
    /// Only `Disconnected` and `Failed` move to `Connecting`; a connect from
    /// `Failed` starts a fresh attempt budget.
    pub fn request_connect(&mut self) -> Transition {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.state = ConnectionState::Connecting;
                self.attempts = 0;
                Transition::Open
            }
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => Transition::Ignored,
        }
    }

    /// Socket opened. Returns false for an open nobody is waiting on.
    pub fn opened(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.last_error = None;
        true
    }

    /// Socket closed, errored, or failed to open.
    pub fn connection_lost(&mut self, code: u16) -> Lost {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return Lost::Ignored;
        }

        if code == NORMAL_CLOSURE {
            self.state = ConnectionState::Disconnected;
            self.attempts = 0;
            return Lost::Closed;
        }

        if self.attempts < self.max_attempts {
            self.attempts += 1;
            self.state = ConnectionState::Reconnecting;
            self.last_error = Some(CONNECTION_ERROR.to_string());
            Lost::Retry(self.base_delay * self.attempts)
        } else {
            self.state = ConnectionState::Failed;
            self.last_error = Some(RECONNECT_EXHAUSTED.to_string());
            Lost::GaveUp
        }
    }

    /// Backoff delay elapsed.
    pub fn reconnect_due(&mut self) -> Transition {
        if self.state == ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
            Transition::Open
        } else {
            Transition::Ignored
        }
    }

    /// Explicit disconnect. Returns true if anything was active.
    pub fn disconnect(&mut self) -> bool {
        let was_active = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
        self.last_error = None;
        was_active
    }
}
