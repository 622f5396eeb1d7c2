//! Mock ORBIT backend for exercising the realtime client locally.
//!
//! Run with: cargo run -p mock-backend
//!
//! Serves the REST auth endpoints on the API port and the per-user
//! notification socket on the WebSocket port, matching the client defaults
//! (`http://localhost:8001` and `ws://localhost:8000`).

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use orbit_core::{InboundMessage, OutboundMessage};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "Mock ORBIT backend")]
struct Args {
    /// Port for /api/login and /api/user/profile.
    #[arg(long, default_value_t = 8001)]
    api_port: u16,
    /// Port for /ws/{user_id}.
    #[arg(long, default_value_t = 8000)]
    ws_port: u16,
    /// Seconds between simulated document updates.
    #[arg(long, default_value_t = 15)]
    document_interval: u64,
}

struct Account {
    password: &'static str,
    user: Value,
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    accounts: Arc<HashMap<&'static str, Account>>,
    tokens: Arc<RwLock<HashMap<String, Value>>>,
    connections: Arc<AtomicUsize>,
    document_interval: Duration,
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
    let state = AppState {
        accounts: Arc::new(demo_accounts()),
        tokens: Arc::new(RwLock::new(HashMap::new())),
        connections: Arc::new(AtomicUsize::new(0)),
        document_interval: Duration::from_secs(args.document_interval.max(1)),
    };

    let api = Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/user/profile", get(profile_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());
    let ws = Router::new()
        .route("/ws/{user_id}", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let api_addr = SocketAddr::from(([127, 0, 0, 1], args.api_port));
    let ws_addr = SocketAddr::from(([127, 0, 0, 1], args.ws_port));
    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    let ws_listener = tokio::net::TcpListener::bind(ws_addr).await?;
    tracing::info!("API listening on http://{api_addr}");
    tracing::info!("Notifications listening on ws://{ws_addr}/ws/{{user_id}}");

    tokio::try_join!(
        axum::serve(api_listener, api).into_future(),
        axum::serve(ws_listener, ws).into_future()
    )?;
    Ok(())
}

fn demo_accounts() -> HashMap<&'static str, Account> {
    let account = |id: u32, email: &str, name: &str, role: &str| Account {
        password: "orbit123",
        user: json!({
            "id": id,
            "email": email,
            "name": name,
            "role": role,
            "created_at": "2024-01-15T10:00:00Z"
        }),
    };
    HashMap::from([
        ("admin@orbit.ia", account(1, "admin@orbit.ia", "Admin", "admin")),
        (
            "cliente@orbit.ia",
            account(2, "cliente@orbit.ia", "Cliente Demo", "client"),
        ),
        (
            "parceiro@orbit.ia",
            account(3, "parceiro@orbit.ia", "Parceiro Demo", "partner"),
        ),
    ])
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

fn detail(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

async fn login_handler(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let Some(account) = state
        .accounts
        .get(req.email.as_str())
        .filter(|a| a.password == req.password)
    else {
        tracing::warn!(email = %req.email, "Rejected login");
        return detail(StatusCode::UNAUTHORIZED, "Incorrect email or password");
    };

    let token = Uuid::new_v4().to_string();
    state
        .tokens
        .write()
        .await
        .insert(token.clone(), account.user.clone());
    tracing::info!(email = %req.email, "Login");
    Json(json!({ "token": token, "user": account.user })).into_response()
}

async fn profile_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let user = match token {
        Some(token) => state.tokens.read().await.get(token).cloned(),
        None => None,
    };
    match user {
        Some(user) => Json(user).into_response(),
        None => detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn frame(message: &InboundMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to serialize message: {e}");
            None
        }
    }
}

/// Simulated processing result for the `n`th document.
fn document_update(n: u32, processing: bool) -> InboundMessage {
    let filename = format!("documento-{n:03}.pdf");
    let status = match (processing, n % 4) {
        (true, _) => "processing",
        (false, 3) => "failed",
        (false, _) => "complete",
    };
    let mut data = json!({
        "document_id": n,
        "original_filename": filename,
        "status": status,
        "timestamp": now(),
    });
    if status == "complete" {
        data["confidence_score"] = json!(0.80 + f64::from(n % 20) / 100.0);
        data["processing_time"] = json!(1.5);
    }
    let mut message = InboundMessage::new("document_processed").with_data(data);
    message.timestamp = Some(now());
    message
}

async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let active = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::info!(%user_id, active, "Notification socket opened");

    let mut greeting = InboundMessage::new("connection_established")
        .with_message("Connected to ORBIT notifications");
    greeting.timestamp = Some(now());
    greeting.extra.insert("user_id".into(), json!(user_id));

    let mut outbox = vec![greeting];
    let mut documents = tokio::time::interval(state.document_interval);
    documents.tick().await;
    let mut document_count = 0_u32;
    let mut pending_result: Option<u32> = None;

    let close_code = 'socket: loop {
        for message in outbox.drain(..) {
            if let Some(msg) = frame(&message) {
                if ws_sender.send(msg).await.is_err() {
                    break 'socket None;
                }
            }
        }

        tokio::select! {
            msg = ws_receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(t))) => t.as_str().to_owned(),
                    Some(Ok(Message::Close(close))) => break close.map(|c| c.code),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {e}");
                        break None;
                    }
                    None => break None,
                };

                match serde_json::from_str::<OutboundMessage>(&text) {
                    Ok(OutboundMessage::Ping { .. }) => {
                        let mut pong = InboundMessage::new("pong");
                        pong.timestamp = Some(now());
                        outbox.push(pong);
                    }
                    Ok(OutboundMessage::RequestStats) => {
                        outbox.push(InboundMessage::new("connection_stats").with_data(json!({
                            "active_connections": state.connections.load(Ordering::SeqCst),
                        })));
                    }
                    Err(e) => tracing::warn!(%user_id, "Invalid client message: {e}"),
                }
            }
            _ = documents.tick() => {
                match pending_result.take() {
                    Some(n) => outbox.push(document_update(n, false)),
                    None => {
                        document_count += 1;
                        pending_result = Some(document_count);
                        outbox.push(document_update(document_count, true));
                    }
                }
            }
        }
    };

    let _ = ws_sender
        .send(Message::Close(Some(CloseFrame {
            code: 1000,
            reason: Utf8Bytes::from_static("bye"),
        })))
        .await;
    let active = state.connections.fetch_sub(1, Ordering::SeqCst) - 1;
    tracing::info!(%user_id, ?close_code, active, "Notification socket closed");
}
