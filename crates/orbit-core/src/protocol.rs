//! Wire protocol for the per-user notification socket.
//!
//! Frames are UTF-8 JSON objects tagged by a `type` field in both directions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Message received from the notification server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message type tag.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human readable text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Server timestamp (ISO 8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Any other top-level fields (e.g. `user_id`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Known inbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ConnectionEstablished,
    DocumentProcessed,
    TestNotification,
    Pong,
    ConnectionStats,
    Unknown,
}

impl InboundMessage {
    /// Create a message with only a type tag.
    #[must_use]
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: None,
            message: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Attach a data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach message text.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Classify the message by its type tag.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self.msg_type.as_str() {
            "connection_established" => MessageKind::ConnectionEstablished,
            "document_processed" => MessageKind::DocumentProcessed,
            "test_notification" => MessageKind::TestNotification,
            "pong" => MessageKind::Pong,
            "connection_stats" => MessageKind::ConnectionStats,
            _ => MessageKind::Unknown,
        }
    }

    /// Parse a text frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a JSON object carrying a string `type`.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        if !matches!(value.get("type"), Some(Value::String(_))) {
            return Err(ProtocolError::MissingType);
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Message sent to the notification server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Keepalive ping.
    Ping { timestamp: String },
    /// Ask the server for connection statistics.
    RequestStats,
}

impl OutboundMessage {
    /// Ping stamped with the current time, millisecond precision UTC.
    #[must_use]
    pub fn ping_now() -> Self {
        Self::Ping {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// Payload of a `document_processed` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Accepted as a number or a numeric string.
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Processing status carried by a document update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Complete,
    Failed,
    Processing,
    Other(String),
}

impl DocumentUpdate {
    /// Decode from a raw payload.
    ///
    /// # Errors
    /// Returns error if a known field has an incompatible type.
    pub fn from_value(data: &Value) -> Result<Self, ProtocolError> {
        Ok(Self::deserialize(data)?)
    }

    /// Typed view of `status`.
    #[must_use]
    pub fn status(&self) -> DocumentStatus {
        match self.status.as_deref() {
            Some("complete") => DocumentStatus::Complete,
            Some("failed") => DocumentStatus::Failed,
            Some("processing") => DocumentStatus::Processing,
            Some(other) => DocumentStatus::Other(other.to_string()),
            None => DocumentStatus::Other("unknown".to_string()),
        }
    }

    /// Filename, or a generic label when the server omitted it.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.original_filename.as_deref().unwrap_or("document")
    }

    /// Confidence formatted as a percentage with one decimal, e.g. `87.3%`.
    ///
    /// A zero or non-finite score yields `None`.
    #[must_use]
    pub fn confidence_percent(&self) -> Option<String> {
        self.confidence_score
            .filter(|score| score.is_finite() && *score != 0.0)
            .map(|score| format!("{:.1}%", score * 100.0))
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Protocol error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame is not a JSON object")]
    NotAnObject,
    #[error("Frame has no string `type` field")]
    MissingType,
}
