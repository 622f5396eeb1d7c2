//! Socket abstraction used by the connection manager.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, stream::BoxStream};
use thiserror::Error;

/// Close code for an intentional, non-retried disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code used when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Intentional client-side disconnect.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(NORMAL_CLOSURE, "client disconnect")
    }

    #[must_use]
    pub const fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

/// Frame or event received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// UTF-8 text frame.
    Text(String),
    /// Peer closed the socket.
    Closed(CloseReason),
}

/// Frame sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close(CloseReason),
}

/// Sending half of an open socket.
pub type OutgoingSink = Pin<Box<dyn Sink<Outgoing, Error = TransportError> + Send>>;

/// Receiving half of an open socket. Ends when the connection drops.
pub type IncomingStream = BoxStream<'static, Result<Incoming, TransportError>>;

/// An open socket.
pub struct Link {
    pub sink: OutgoingSink,
    pub stream: IncomingStream,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Transport error.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("Connection closed: {0}")]
    Closed(String),
}

/// Opens sockets for the connection manager.
///
/// Implement this to plug in a different socket library or an in-memory
/// transport for tests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}
