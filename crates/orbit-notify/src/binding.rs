//! Keeps one live notification connection per signed-in user.

use std::sync::Arc;

use orbit_core::RealtimeSettings;
use orbit_session::Session;
use orbit_transport::{ConnectionHandle, ConnectionManager, Connector};
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};

use crate::{
    center::NotificationCenter,
    dispatcher::{Dispatcher, DocumentUpdateHandler},
};

/// Connection owned on behalf of one user.
struct Active {
    user_key: String,
    manager: ConnectionManager,
    dispatcher: JoinHandle<()>,
}

struct Binder {
    settings: RealtimeSettings,
    connector: Arc<dyn Connector>,
    center: NotificationCenter,
    on_document: Option<Arc<dyn DocumentUpdateHandler>>,
    sessions: watch::Receiver<Option<Session>>,
    connection: watch::Sender<Option<ConnectionHandle>>,
}

impl Binder {
    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        let mut active: Option<Active> = None;
        loop {
            let wanted = self
                .sessions
                .borrow_and_update()
                .as_ref()
                .map(|s| s.user_key().to_string());

            if active.as_ref().map(|a| a.user_key.as_str()) != wanted.as_deref() {
                if let Some(old) = active.take() {
                    self.stop(old).await;
                }
                active = wanted.map(|user_key| self.start(user_key));
            }

            tokio::select! {
                _ = &mut stop => break,
                changed = self.sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(old) = active.take() {
            self.stop(old).await;
        }
    }

    fn start(&self, user_key: String) -> Active {
        tracing::info!(user_id = %user_key, "Starting realtime updates");
        let manager = ConnectionManager::spawn(
            &self.settings,
            Arc::clone(&self.connector),
            Some(user_key.clone()),
        );

        let mut dispatcher = Dispatcher::new(self.center.clone());
        if let Some(handler) = &self.on_document {
            dispatcher = dispatcher.with_document_handler(Arc::clone(handler));
        }
        // Subscribe before connecting so the greeting is not missed.
        let dispatcher = tokio::spawn(dispatcher.run(manager.subscribe(), manager.watch_status()));

        manager.connect();
        self.connection.send_replace(Some(manager.handle()));
        Active {
            user_key,
            manager,
            dispatcher,
        }
    }

    async fn stop(&self, active: Active) {
        tracing::info!(user_id = %active.user_key, "Stopping realtime updates");
        self.connection.send_replace(None);
        active.manager.disconnect();
        active.dispatcher.abort();
        active.manager.shutdown().await;
    }
}

/// Follows the signed-in session: connects on login, disconnects on logout.
///
/// Dropping this value tears the connection down in the background;
/// [`RealtimeUpdates::shutdown`] waits for it.
pub struct RealtimeUpdates {
    connection: watch::Receiver<Option<ConnectionHandle>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeUpdates {
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        settings: RealtimeSettings,
        connector: Arc<dyn Connector>,
        sessions: watch::Receiver<Option<Session>>,
        center: NotificationCenter,
        on_document: Option<Arc<dyn DocumentUpdateHandler>>,
    ) -> Self {
        let (connection_tx, connection) = watch::channel(None);
        let (stop, stop_rx) = oneshot::channel();
        let binder = Binder {
            settings,
            connector,
            center,
            on_document,
            sessions,
            connection: connection_tx,
        };
        Self {
            connection,
            stop: Some(stop),
            task: Some(tokio::spawn(binder.run(stop_rx))),
        }
    }

    /// Handle of the current connection, if a user is signed in.
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.connection.borrow().clone()
    }

    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<Option<ConnectionHandle>> {
        self.connection.clone()
    }

    /// Disconnect and wait for teardown.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Realtime updates task failed: {e}");
            }
        }
    }
}
