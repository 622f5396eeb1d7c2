//! Core abstractions for the ORBIT realtime client.
//!
//! This crate provides the fundamental building blocks:
//! - `InboundMessage` / `OutboundMessage` - JSON wire protocol
//! - `ConnectionState` / `ConnectionStatus` - Observable connection status
//! - `MessageHub` - Latest-message slot + broadcast of sequenced envelopes
//! - `RealtimeSettings` - Layered client configuration

pub mod hub;
pub mod protocol;
pub mod settings;
pub mod state;

pub use hub::{Envelope, MessageHub};
pub use protocol::{
    DocumentStatus, DocumentUpdate, InboundMessage, MessageKind, OutboundMessage, ProtocolError,
};
pub use settings::{RealtimeSettings, SettingsError};
pub use state::{ConnectionState, ConnectionStatus};
