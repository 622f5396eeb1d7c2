//! Connection manager for the per-user notification socket.
//!
//! A single actor task owns the socket, the reconnect timer, the heartbeat
//! interval and the counters. Handles talk to it over a command channel and
//! observe it through `watch` (status) and `broadcast` (messages).

use std::{future, ops::Deref, pin::Pin, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt, future::BoxFuture};
use orbit_core::{
    ConnectionState, ConnectionStatus, Envelope, InboundMessage, MessageHub, OutboundMessage,
    RealtimeSettings,
};
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, Sleep},
};

use crate::{
    link::{ABNORMAL_CLOSURE, CloseReason, Connector, Incoming, Link, Outgoing, TransportError},
    machine::{ConnectionMachine, Lost, Transition},
};

/// Upper bound on flushing the close frame during disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

enum Command {
    Connect,
    Disconnect,
    Send(String),
    Shutdown,
}

/// Cloneable handle to a running connection manager.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    hub: Arc<MessageHub>,
}

impl ConnectionHandle {
    /// Start connecting. No-op without a user or while already active.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Cancel timers and close the socket with code 1000.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Serialize and send a message if connected; otherwise drop it.
    pub fn send<T: Serialize>(&self, message: &T) {
        match serde_json::to_string(message) {
            Ok(json) => {
                let _ = self.commands.send(Command::Send(json));
            }
            Err(e) => tracing::warn!("Failed to serialize outbound message: {e}"),
        }
    }

    /// Send `{"type":"ping","timestamp":...}`.
    pub fn send_heartbeat(&self) {
        self.send(&OutboundMessage::ping_now());
    }

    /// Send `{"type":"request_stats"}`.
    pub fn request_stats(&self) {
        self.send(&OutboundMessage::RequestStats);
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    /// Most recently received message.
    #[must_use]
    pub fn latest_message(&self) -> Option<Arc<Envelope>> {
        self.hub.latest()
    }

    /// Live messages, each delivered once.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.hub.subscribe()
    }

    /// Status updates.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// Owner of the connection actor.
///
/// Dropping the manager tears the connection down.
pub struct ConnectionManager {
    handle: ConnectionHandle,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Spawn the actor for `user_id`. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        settings: &RealtimeSettings,
        connector: Arc<dyn Connector>,
        user_id: Option<String>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let machine = ConnectionMachine::from_settings(settings);
        let (status_tx, status) = watch::channel(machine.status());
        let hub = Arc::new(MessageHub::new());

        let worker = Worker {
            url: user_id.as_deref().map(|id| settings.ws_url_for(id)),
            user_id,
            machine,
            connector,
            commands: command_rx,
            status: status_tx,
            hub: Arc::clone(&hub),
            heartbeat_period: settings.heartbeat_interval(),
            pending: None,
            link: None,
            reconnect: None,
            heartbeat: None,
        };

        Self {
            handle: ConnectionHandle {
                commands,
                status,
                hub,
            },
            task: Some(tokio::spawn(worker.run())),
        }
    }

    /// Cloneable handle.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Disconnect and wait for the actor to exit.
    pub async fn shutdown(mut self) {
        let _ = self.handle.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Connection task failed: {e}");
            }
        }
    }
}

impl Deref for ConnectionManager {
    type Target = ConnectionHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.handle.commands.send(Command::Shutdown);
        }
    }
}

enum Step {
    Command(Option<Command>),
    Opened(Result<Link, TransportError>),
    Incoming(Option<Result<Incoming, TransportError>>),
    ReconnectDue,
    Heartbeat,
}

struct Worker {
    user_id: Option<String>,
    url: Option<String>,
    machine: ConnectionMachine,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    hub: Arc<MessageHub>,
    heartbeat_period: Duration,
    pending: Option<BoxFuture<'static, Result<Link, TransportError>>>,
    link: Option<Link>,
    reconnect: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Interval>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                biased;
                cmd = self.commands.recv() => Step::Command(cmd),
                res = opening(&mut self.pending) => Step::Opened(res),
                event = incoming(&mut self.link) => Step::Incoming(event),
                () = expired(&mut self.reconnect) => Step::ReconnectDue,
                () = ticked(&mut self.heartbeat) => Step::Heartbeat,
            };

            match step {
                Step::Command(None | Some(Command::Shutdown)) => {
                    self.disconnect().await;
                    break;
                }
                Step::Command(Some(Command::Connect)) => self.connect(),
                Step::Command(Some(Command::Disconnect)) => self.disconnect().await,
                Step::Command(Some(Command::Send(json))) => self.send(json).await,
                Step::Opened(result) => {
                    self.pending = None;
                    self.on_opened(result);
                }
                Step::Incoming(event) => self.on_incoming(event),
                Step::ReconnectDue => {
                    self.reconnect = None;
                    if self.machine.reconnect_due() == Transition::Open {
                        self.open();
                    }
                }
                Step::Heartbeat => {
                    tracing::debug!("Sending heartbeat");
                    match serde_json::to_string(&OutboundMessage::ping_now()) {
                        Ok(json) => self.send(json).await,
                        Err(e) => tracing::warn!("Failed to serialize ping: {e}"),
                    }
                }
            }
        }
        tracing::debug!("Connection task stopped");
    }

    fn connect(&mut self) {
        if self.url.is_none() {
            tracing::info!("No authenticated user, not connecting");
            return;
        }
        match self.machine.request_connect() {
            Transition::Open => self.open(),
            Transition::Ignored => {
                tracing::debug!(state = %self.machine.state(), "Connect ignored, already active");
            }
        }
    }

    fn open(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        tracing::info!(
            user_id = self.user_id.as_deref().unwrap_or_default(),
            attempt = self.machine.attempts(),
            "Connecting to {url}"
        );
        let connector = Arc::clone(&self.connector);
        self.pending = Some(Box::pin(async move { connector.connect(&url).await }));
        self.publish();
    }

    fn on_opened(&mut self, result: Result<Link, TransportError>) {
        match result {
            Ok(link) => {
                if !self.machine.opened() {
                    return;
                }
                tracing::info!("Connected");
                self.link = Some(link);
                let mut heartbeat = tokio::time::interval_at(
                    Instant::now() + self.heartbeat_period,
                    self.heartbeat_period,
                );
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(heartbeat);
                self.publish();
            }
            Err(e) => {
                tracing::error!("Connection error: {e}");
                self.lost(ABNORMAL_CLOSURE);
            }
        }
    }

    fn on_incoming(&mut self, event: Option<Result<Incoming, TransportError>>) {
        match event {
            Some(Ok(Incoming::Text(text))) => match InboundMessage::parse(&text) {
                Ok(message) => {
                    tracing::debug!(msg_type = %message.msg_type, "Message received");
                    self.hub.push(message);
                }
                Err(e) => tracing::warn!("Dropping unparseable frame: {e}"),
            },
            Some(Ok(Incoming::Closed(reason))) => {
                tracing::info!(code = reason.code, reason = %reason.reason, "Connection closed");
                self.link = None;
                self.lost(reason.code);
            }
            Some(Err(e)) => {
                tracing::error!("Connection error: {e}");
                self.link = None;
                self.lost(ABNORMAL_CLOSURE);
            }
            None => {
                tracing::info!("Connection dropped");
                self.link = None;
                self.lost(ABNORMAL_CLOSURE);
            }
        }
    }

    fn lost(&mut self, code: u16) {
        self.heartbeat = None;
        match self.machine.connection_lost(code) {
            Lost::Retry(delay) => {
                tracing::info!(
                    attempt = self.machine.attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Lost::GaveUp => {
                tracing::warn!(attempts = self.machine.attempts(), "Giving up reconnecting");
            }
            Lost::Closed | Lost::Ignored => {}
        }
        self.publish();
    }

    async fn send(&mut self, json: String) {
        let link = match (&mut self.link, self.machine.state()) {
            (Some(link), ConnectionState::Connected) => link,
            _ => {
                tracing::warn!("Dropping message, no active connection");
                return;
            }
        };
        if let Err(e) = link.sink.send(Outgoing::Text(json)).await {
            tracing::warn!("Failed to send message: {e}");
        }
    }

    async fn disconnect(&mut self) {
        self.reconnect = None;
        self.heartbeat = None;
        self.pending = None;

        if let Some(mut link) = self.link.take() {
            tracing::info!("Disconnecting");
            let close = link.sink.send(Outgoing::Close(CloseReason::normal()));
            match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("Close frame not sent: {e}"),
                Err(_) => tracing::debug!("Close frame timed out"),
            }
        }

        if self.machine.disconnect() {
            self.publish();
        }
    }

    fn publish(&self) {
        let next = self.machine.status();
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn opening(
    pending: &mut Option<BoxFuture<'static, Result<Link, TransportError>>>,
) -> Result<Link, TransportError> {
    match pending {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

async fn incoming(link: &mut Option<Link>) -> Option<Result<Incoming, TransportError>> {
    match link {
        Some(link) => link.stream.next().await,
        None => future::pending().await,
    }
}

async fn expired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

async fn ticked(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use serde_json::{Value, json};

    use super::*;
    use crate::machine::{CONNECTION_ERROR, RECONNECT_EXHAUSTED};

    /// Server end of an in-memory link.
    struct ServerEnd {
        to_client: fmpsc::UnboundedSender<Result<Incoming, TransportError>>,
        from_client: fmpsc::UnboundedReceiver<Outgoing>,
    }

    impl ServerEnd {
        fn push_text(&self, text: &str) {
            self.to_client
                .unbounded_send(Ok(Incoming::Text(text.to_string())))
                .unwrap();
        }

        fn close(&self, code: u16) {
            self.to_client
                .unbounded_send(Ok(Incoming::Closed(CloseReason::new(code, "server"))))
                .unwrap();
        }

        async fn next_outgoing(&mut self) -> Option<Outgoing> {
            self.from_client.next().await
        }
    }

    struct Attempt {
        url: String,
        at: Instant,
        server: Option<ServerEnd>,
    }

    struct FakeConnector {
        refuse: AtomicBool,
        attempts: mpsc::UnboundedSender<Attempt>,
    }

    impl FakeConnector {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Attempt>) {
            let (attempts, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    refuse: AtomicBool::new(false),
                    attempts,
                }),
                rx,
            )
        }

        fn refuse(&self, refuse: bool) {
            self.refuse.store(refuse, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, url: &str) -> Result<Link, TransportError> {
            let at = Instant::now();
            if self.refuse.load(Ordering::SeqCst) {
                let _ = self.attempts.send(Attempt {
                    url: url.to_string(),
                    at,
                    server: None,
                });
                return Err(TransportError::Connect("refused".into()));
            }

            let (to_client, client_rx) = fmpsc::unbounded();
            let (client_tx, from_client) = fmpsc::unbounded();
            let _ = self.attempts.send(Attempt {
                url: url.to_string(),
                at,
                server: Some(ServerEnd {
                    to_client,
                    from_client,
                }),
            });
            Ok(Link {
                sink: Box::pin(
                    client_tx.sink_map_err(|e| TransportError::Closed(e.to_string())),
                ),
                stream: client_rx.boxed(),
            })
        }
    }

    fn spawn(connector: Arc<FakeConnector>, user: Option<&str>) -> ConnectionManager {
        ConnectionManager::spawn(
            &RealtimeSettings::default(),
            connector,
            user.map(ToString::to_string),
        )
    }

    async fn wait_for(
        manager: &ConnectionManager,
        pred: impl FnMut(&ConnectionStatus) -> bool,
    ) -> ConnectionStatus {
        let mut rx = manager.watch_status();
        let status = rx.wait_for(pred).await.unwrap().clone();
        status
    }

    async fn connected(
        manager: &ConnectionManager,
        attempts: &mut mpsc::UnboundedReceiver<Attempt>,
    ) -> ServerEnd {
        manager.connect();
        let server = attempts.recv().await.unwrap().server.unwrap();
        wait_for(manager, ConnectionStatus::is_connected).await;
        server
    }

    /// Paused-clock timers fire on millisecond ticks.
    fn assert_elapsed(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "elapsed {actual:?}, expected {expected:?}"
        );
    }

    fn text(outgoing: Outgoing) -> Value {
        match outgoing {
            Outgoing::Text(t) => serde_json::from_str(&t).unwrap(),
            Outgoing::Close(reason) => panic!("unexpected close {reason:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_to_per_user_endpoint() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("42"));
        manager.connect();

        let attempt = attempts.recv().await.unwrap();
        assert_eq!(attempt.url, "ws://localhost:8000/ws/42");

        let status = wait_for(&manager, ConnectionStatus::is_connected).await;
        assert_eq!(status.attempts, 0);
        assert_eq!(status.last_error, None);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_user_is_noop() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, None);
        manager.connect();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(attempts.try_recv().is_err());
        assert_eq!(manager.status().state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connected_is_noop() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("1"));
        let _server = connected(&manager, &mut attempts).await;

        manager.connect();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(attempts.try_recv().is_err());
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_then_failed() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(Arc::clone(&connector), Some("7"));
        let server = connected(&manager, &mut attempts).await;

        connector.refuse(true);
        let mut previous = Instant::now();
        drop(server);

        for n in 1..=5u64 {
            let attempt = attempts.recv().await.unwrap();
            assert!(attempt.server.is_none());
            assert_elapsed(attempt.at - previous, Duration::from_millis(3000 * n));
            previous = attempt.at;
        }

        let status = wait_for(&manager, |s| s.state == ConnectionState::Failed).await;
        assert_eq!(status.attempts, 5);
        assert_eq!(status.last_error.as_deref(), Some(RECONNECT_EXHAUSTED));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(attempts.try_recv().is_err());
        assert_eq!(manager.status().state, ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_success_resets_counter() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let server = connected(&manager, &mut attempts).await;

        server.close(1011);
        let status = wait_for(&manager, |s| s.state == ConnectionState::Reconnecting).await;
        assert_eq!(status.attempts, 1);
        assert_eq!(status.last_error.as_deref(), Some(CONNECTION_ERROR));

        let retry = attempts.recv().await.unwrap();
        assert!(retry.server.is_some());
        let status = wait_for(&manager, ConnectionStatus::is_connected).await;
        assert_eq!(status.attempts, 0);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_normal_close_does_not_retry() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let server = connected(&manager, &mut attempts).await;

        server.close(1000);
        wait_for(&manager, |s| s.state == ConnectionState::Disconnected).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let server = connected(&manager, &mut attempts).await;

        drop(server);
        wait_for(&manager, |s| s.state == ConnectionState::Reconnecting).await;

        manager.disconnect();
        let status = wait_for(&manager, |s| s.state == ConnectionState::Disconnected).await;
        assert_eq!(status.attempts, 0);
        assert_eq!(status.last_error, None);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_sends_normal_close_and_stops_heartbeat() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let mut server = connected(&manager, &mut attempts).await;

        manager.disconnect();
        assert_eq!(
            server.next_outgoing().await,
            Some(Outgoing::Close(CloseReason::normal()))
        );
        wait_for(&manager, |s| s.state == ConnectionState::Disconnected).await;

        // A late close from the peer is not an abnormal closure.
        let _ = server
            .to_client
            .unbounded_send(Ok(Incoming::Closed(CloseReason::new(1006, "late"))));
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(attempts.try_recv().is_err());
        assert_eq!(manager.status().state, ConnectionState::Disconnected);
        assert_eq!(server.next_outgoing().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_every_interval_while_connected() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let mut server = connected(&manager, &mut attempts).await;
        let start = Instant::now();

        let ping = text(server.next_outgoing().await.unwrap());
        assert_eq!(ping["type"], "ping");
        assert!(ping["timestamp"].is_string());
        assert_elapsed(start.elapsed(), Duration::from_secs(30));

        text(server.next_outgoing().await.unwrap());
        assert_elapsed(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_only_while_connected() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));

        manager.send(&json!({"type": "hello"}));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.status(), ConnectionStatus::default());

        let mut server = connected(&manager, &mut attempts).await;
        manager.request_stats();
        assert_eq!(
            text(server.next_outgoing().await.unwrap()),
            json!({"type": "request_stats"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_are_sequenced_and_bad_frames_dropped() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let mut messages = manager.subscribe();
        let server = connected(&manager, &mut attempts).await;

        server.push_text(r#"{"type":"connection_established","message":"hi"}"#);
        server.push_text("not json");
        server.push_text(r#"{"data":{"status":"complete"}}"#);
        server.push_text(r#"{"type":"pong"}"#);

        let first = messages.recv().await.unwrap();
        let second = messages.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.message.msg_type, "connection_established");
        assert_eq!(second.seq, 2);
        assert_eq!(second.message.msg_type, "pong");

        let latest = manager.latest_message().unwrap();
        assert!(Arc::ptr_eq(&latest, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_failed_starts_over() {
        let settings = RealtimeSettings {
            max_reconnect_attempts: 1,
            ..RealtimeSettings::default()
        };
        let (connector, mut attempts) = FakeConnector::new();
        let manager = ConnectionManager::spawn(
            &settings,
            Arc::clone(&connector) as Arc<dyn Connector>,
            Some("7".into()),
        );

        connector.refuse(true);
        manager.connect();
        attempts.recv().await.unwrap();
        attempts.recv().await.unwrap();
        wait_for(&manager, |s| s.state == ConnectionState::Failed).await;

        connector.refuse(false);
        manager.connect();
        assert!(attempts.recv().await.unwrap().server.is_some());
        wait_for(&manager, ConnectionStatus::is_connected).await;
    }

    /// Handshake that never completes.
    struct StalledConnector {
        attempts: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, url: &str) -> Result<Link, TransportError> {
            let _ = self.attempts.send(url.to_string());
            future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting_abandons_attempt() {
        let (attempts_tx, mut attempts) = mpsc::unbounded_channel();
        let manager = ConnectionManager::spawn(
            &RealtimeSettings::default(),
            Arc::new(StalledConnector {
                attempts: attempts_tx,
            }),
            Some("7".into()),
        );
        manager.connect();
        attempts.recv().await.unwrap();
        wait_for(&manager, |s| s.state == ConnectionState::Connecting).await;

        manager.disconnect();
        let status = wait_for(&manager, |s| s.state == ConnectionState::Disconnected).await;
        assert_eq!(status, ConnectionStatus::default());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(manager.status(), ConnectionStatus::default());
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_from_failed_clears_error() {
        let settings = RealtimeSettings {
            max_reconnect_attempts: 1,
            ..RealtimeSettings::default()
        };
        let (connector, mut attempts) = FakeConnector::new();
        let manager = ConnectionManager::spawn(
            &settings,
            Arc::clone(&connector) as Arc<dyn Connector>,
            Some("7".into()),
        );

        connector.refuse(true);
        manager.connect();
        attempts.recv().await.unwrap();
        attempts.recv().await.unwrap();
        let status = wait_for(&manager, |s| s.state == ConnectionState::Failed).await;
        assert_eq!(status.last_error.as_deref(), Some(RECONNECT_EXHAUSTED));

        manager.disconnect();
        let status = wait_for(&manager, |s| s.state == ConnectionState::Disconnected).await;
        assert_eq!(status.attempts, 0);
        assert_eq!(status.last_error, None);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(attempts.try_recv().is_err());
        assert_eq!(manager.status(), ConnectionStatus::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_socket() {
        let (connector, mut attempts) = FakeConnector::new();
        let manager = spawn(connector, Some("7"));
        let mut server = connected(&manager, &mut attempts).await;

        manager.shutdown().await;
        assert_eq!(
            server.next_outgoing().await,
            Some(Outgoing::Close(CloseReason::normal()))
        );
        assert_eq!(server.next_outgoing().await, None);
    }
}
