//! Auto-expiring user notifications.

use std::{
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, task::AbortHandle};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: Level,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Time until automatic dismissal.
    pub ttl: Duration,
}

/// Why a notification went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Expired,
    Dismissed,
    Cleared,
}

/// Change feed for renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Shown(Notification),
    Dismissed { id: Uuid, reason: DismissReason },
}

struct Entry {
    notification: Notification,
    expiry: AbortHandle,
}

struct Inner {
    active: Mutex<Vec<Entry>>,
    events: broadcast::Sender<NotificationEvent>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in active.drain(..) {
            entry.expiry.abort();
        }
    }
}

/// Shared queue of active notifications.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    /// Show a notification that dismisses itself after `ttl`.
    ///
    /// Must be called within a tokio runtime.
    pub fn push(&self, level: Level, text: impl Into<String>, ttl: Duration) -> Uuid {
        let notification = Notification {
            id: Uuid::new_v4(),
            level,
            text: text.into(),
            created_at: Utc::now(),
            ttl,
        };
        let id = notification.id;

        // The entry is inserted before the expiry task can take the lock.
        let mut active = self.lock();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                remove(&inner, id, DismissReason::Expired);
            }
        })
        .abort_handle();

        tracing::debug!(%id, ?level, text = %notification.text, "Notification shown");
        active.push(Entry {
            notification: notification.clone(),
            expiry,
        });
        let _ = self.inner.events.send(NotificationEvent::Shown(notification));
        drop(active);
        id
    }

    pub fn info(&self, text: impl Into<String>, ttl: Duration) -> Uuid {
        self.push(Level::Info, text, ttl)
    }

    pub fn success(&self, text: impl Into<String>, ttl: Duration) -> Uuid {
        self.push(Level::Success, text, ttl)
    }

    pub fn warning(&self, text: impl Into<String>, ttl: Duration) -> Uuid {
        self.push(Level::Warning, text, ttl)
    }

    pub fn error(&self, text: impl Into<String>, ttl: Duration) -> Uuid {
        self.push(Level::Error, text, ttl)
    }

    /// Dismiss early. Returns false if it was already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        remove(&self.inner, id, DismissReason::Dismissed)
    }

    /// Dismiss everything.
    pub fn clear(&self) {
        let drained: Vec<Entry> = self.lock().drain(..).collect();
        for entry in drained {
            entry.expiry.abort();
            let _ = self.inner.events.send(NotificationEvent::Dismissed {
                id: entry.notification.id,
                reason: DismissReason::Cleared,
            });
        }
    }

    /// Currently visible notifications, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Notification> {
        self.lock().iter().map(|e| e.notification.clone()).collect()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.events.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove(inner: &Inner, id: Uuid, reason: DismissReason) -> bool {
    let entry = {
        let mut active = inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = active.iter().position(|e| e.notification.id == id) else {
            return false;
        };
        active.remove(pos)
    };
    if reason != DismissReason::Expired {
        entry.expiry.abort();
    }
    tracing::debug!(%id, ?reason, "Notification dismissed");
    let _ = inner.events.send(NotificationEvent::Dismissed { id, reason });
    true
}
