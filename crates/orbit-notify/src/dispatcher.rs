//! Turns inbound socket messages into notifications and document callbacks.

use std::{sync::Arc, time::Duration};

use orbit_core::{ConnectionStatus, DocumentStatus, DocumentUpdate, Envelope, MessageKind};
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::center::NotificationCenter;

const CONNECTED_TTL: Duration = Duration::from_secs(3);
const COMPLETE_TTL: Duration = Duration::from_secs(6);
const FAILED_TTL: Duration = Duration::from_secs(8);
const PROCESSING_TTL: Duration = Duration::from_secs(4);
const STATUS_TTL: Duration = Duration::from_secs(5);
const TEST_TTL: Duration = Duration::from_secs(5);
const CONNECTION_ERROR_TTL: Duration = Duration::from_secs(10);

/// Receives the raw `data` of every `document_processed` message.
pub trait DocumentUpdateHandler: Send + Sync {
    fn document_updated(&self, data: &Value);
}

impl<F> DocumentUpdateHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn document_updated(&self, data: &Value) {
        self(data);
    }
}

/// Applies each envelope's effect at most once.
pub struct Dispatcher {
    center: NotificationCenter,
    on_document: Option<Arc<dyn DocumentUpdateHandler>>,
    last_seq: u64,
    last_error: Option<String>,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(center: NotificationCenter) -> Self {
        Self {
            center,
            on_document: None,
            last_seq: 0,
            last_error: None,
        }
    }

    #[must_use]
    pub fn with_document_handler(mut self, handler: Arc<dyn DocumentUpdateHandler>) -> Self {
        self.on_document = Some(handler);
        self
    }

    /// Handle one envelope. Returns false if it was already handled.
    pub fn handle(&mut self, envelope: &Envelope) -> bool {
        if envelope.seq <= self.last_seq {
            tracing::trace!(seq = envelope.seq, "Envelope already handled");
            return false;
        }
        self.last_seq = envelope.seq;

        let message = &envelope.message;
        match message.kind() {
            MessageKind::ConnectionEstablished => {
                self.center
                    .info("Connected to the notification service", CONNECTED_TTL);
            }
            MessageKind::DocumentProcessed => match &message.data {
                Some(data) => self.document_processed(data),
                None => tracing::warn!(seq = envelope.seq, "document_processed without data"),
            },
            MessageKind::TestNotification => {
                match message.message.as_deref().filter(|m| !m.trim().is_empty()) {
                    Some(text) => {
                        self.center.info(text, TEST_TTL);
                    }
                    None => {
                        tracing::warn!(seq = envelope.seq, "test_notification without message");
                    }
                }
            }
            MessageKind::Pong => tracing::debug!("Pong received"),
            MessageKind::ConnectionStats => {
                tracing::info!(stats = ?message.data, "Connection stats");
            }
            MessageKind::Unknown => {
                tracing::info!(msg_type = %message.msg_type, "Unrecognized message type");
            }
        }
        true
    }

    fn document_processed(&self, data: &Value) {
        let update = DocumentUpdate::from_value(data).unwrap_or_else(|e| {
            tracing::warn!("Malformed document update: {e}");
            DocumentUpdate::default()
        });
        let file = update.filename();

        match update.status() {
            DocumentStatus::Complete => {
                let text = match update.confidence_percent() {
                    Some(pct) => format!("{file} processed successfully (confidence: {pct})"),
                    None => format!("{file} processed successfully"),
                };
                self.center.success(text, COMPLETE_TTL);
            }
            DocumentStatus::Failed => {
                self.center
                    .error(format!("Failed to process {file}"), FAILED_TTL);
            }
            DocumentStatus::Processing => {
                self.center.info(format!("Processing {file}..."), PROCESSING_TTL);
            }
            DocumentStatus::Other(status) => {
                self.center
                    .info(format!("Status of {file} updated: {status}"), STATUS_TTL);
            }
        }

        if let Some(handler) = &self.on_document {
            handler.document_updated(data);
        }
    }

    /// Raise one error notification per change of the connection error.
    pub fn observe_status(&mut self, status: &ConnectionStatus) {
        if status.last_error == self.last_error {
            return;
        }
        self.last_error.clone_from(&status.last_error);
        if let Some(error) = status.last_error.as_deref().filter(|e| !e.is_empty()) {
            self.center.error(error, CONNECTION_ERROR_TTL);
        }
    }

    /// Dispatch until the message stream closes.
    pub async fn run(
        mut self,
        mut messages: broadcast::Receiver<Arc<Envelope>>,
        mut status: watch::Receiver<ConnectionStatus>,
    ) {
        let initial = status.borrow_and_update().clone();
        self.observe_status(&initial);
        let mut status_open = true;

        loop {
            tokio::select! {
                received = messages.recv() => match received {
                    Ok(envelope) => {
                        self.handle(&envelope);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Dispatcher lagged, skipped {n} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = status.changed(), if status_open => {
                    if changed.is_err() {
                        status_open = false;
                        continue;
                    }
                    let snapshot = status.borrow_and_update().clone();
                    self.observe_status(&snapshot);
                }
            }
        }
        tracing::debug!(last_seq = self.last_seq, "Dispatcher stopped");
    }
}
