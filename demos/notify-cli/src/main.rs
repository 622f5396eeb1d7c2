//! Terminal client for ORBIT realtime notifications.
//!
//! Run with: cargo run -p notify-cli -- --email cliente@orbit.ia --password orbit123
//!
//! Signs in (or restores the saved session), follows the per-user
//! notification socket and prints every notification until Ctrl-C.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use orbit_core::RealtimeSettings;
use orbit_notify::{
    DismissReason, DocumentUpdateHandler, Level, NotificationCenter, NotificationEvent,
    RealtimeUpdates,
};
use orbit_session::{AuthStore, storage::FileStorage};
use orbit_transport::WebSocketConnector;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(about = "Print ORBIT notifications for the signed-in user")]
struct Args {
    /// JSON settings file.
    #[arg(long, env = "ORBIT_CONFIG")]
    config: Option<PathBuf>,
    /// Email for a fresh login.
    #[arg(long)]
    email: Option<String>,
    /// Password for a fresh login.
    #[arg(long, env = "ORBIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Forget the saved session and exit.
    #[arg(long)]
    logout: bool,
    /// Ask the server for connection stats every N seconds.
    #[arg(long)]
    stats_every: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let settings =
        RealtimeSettings::load(args.config.as_deref()).context("Failed to load settings")?;
    let credentials = settings
        .credentials_path
        .clone()
        .unwrap_or_else(FileStorage::default_path);
    let auth = AuthStore::new(settings.clone(), Arc::new(FileStorage::new(credentials)));

    if args.logout {
        auth.logout().await;
        println!("Signed out");
        return Ok(());
    }

    let session = match (auth.initialize().await, args.email, args.password) {
        (Some(session), None, _) => session,
        (_, Some(email), Some(password)) => auth.login(&email, &password).await?,
        _ => anyhow::bail!("No saved session; pass --email and --password"),
    };
    println!(
        "Signed in as {} ({}), user id {}",
        session.user.name,
        session.user.role,
        session.user_key()
    );

    let center = NotificationCenter::new();
    let mut events = center.subscribe();
    let on_document: Arc<dyn DocumentUpdateHandler> = Arc::new(|data: &Value| {
        let id = data.get("document_id").map_or_else(|| "?".to_string(), ToString::to_string);
        tracing::info!(document_id = %id, "Document list needs refresh");
    });
    let updates = RealtimeUpdates::spawn(
        settings,
        Arc::new(WebSocketConnector::new()),
        auth.subscribe(),
        center,
        Some(on_document),
    );

    let mut stats = args
        .stats_every
        .map(|secs| tokio::time::interval(Duration::from_secs(secs.max(1))));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {n} notifications"),
                Err(RecvError::Closed) => break,
            },
            _ = tick(stats.as_mut()) => {
                if let Some(connection) = updates.connection() {
                    connection.request_stats();
                }
            }
        }
    }

    updates.shutdown().await;
    Ok(())
}

async fn tick(interval: Option<&mut tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn print_event(event: &NotificationEvent) {
    match event {
        NotificationEvent::Shown(n) => {
            let tag = match n.level {
                Level::Info => "info",
                Level::Success => " ok ",
                Level::Warning => "warn",
                Level::Error => "FAIL",
            };
            println!(
                "[{}] {tag} {} ({}s)",
                n.created_at.format("%H:%M:%S"),
                n.text,
                n.ttl.as_secs()
            );
        }
        NotificationEvent::Dismissed { id, reason } => {
            if *reason != DismissReason::Expired {
                tracing::debug!(%id, ?reason, "Notification dismissed");
            }
        }
    }
}
