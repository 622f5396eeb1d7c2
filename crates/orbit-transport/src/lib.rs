//! Transport layer for the per-user notification socket.
//!
//! Provides:
//! - `Connector` - Seam for opening a socket (real or in-memory)
//! - `ConnectionMachine` - Pure reconnect/backoff state machine
//! - `ConnectionManager` - Actor owning the socket, timers and counters
//! - WebSocket connector (feature: websocket)

pub mod link;
pub mod machine;
pub mod manager;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use link::{CloseReason, Connector, Incoming, Link, Outgoing, TransportError};
pub use machine::{ConnectionMachine, Lost, Transition};
pub use manager::{ConnectionHandle, ConnectionManager};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
