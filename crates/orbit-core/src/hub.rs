//! Latest-message slot with broadcast fan-out.

use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::InboundMessage;

/// Live subscriber buffer. Slow subscribers lag rather than block the socket.
const CHANNEL_CAPACITY: usize = 256;

/// An inbound message stamped with its delivery sequence number.
///
/// Envelopes are immutable and shared; consumers deduplicate on `seq`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Monotonic per-hub sequence number, starting at 1.
    pub seq: u64,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
    pub message: InboundMessage,
}

/// Message hub owned by one connection manager.
///
/// Holds the most recent message (replaced, never queued) and fans every
/// message out to live subscribers exactly once.
pub struct MessageHub {
    latest: RwLock<Option<Arc<Envelope>>>,
    next_seq: AtomicU64,
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: RwLock::new(None),
            next_seq: AtomicU64::new(1),
            sender,
        }
    }

    /// Stamp a message, make it the latest, and deliver it to subscribers.
    pub fn push(&self, message: InboundMessage) -> Arc<Envelope> {
        let envelope = Arc::new(Envelope {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            received_at: Utc::now(),
            message,
        });

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&envelope));
        let _ = self.sender.send(Arc::clone(&envelope)); // no subscribers is fine
        envelope
    }

    /// Most recently received message.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Envelope>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get a receiver for live messages.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.sender.subscribe()
    }

    /// Stream of live messages. Lagged gaps are logged and skipped.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, Arc<Envelope>> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(envelope) => Some(envelope),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "message subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}
