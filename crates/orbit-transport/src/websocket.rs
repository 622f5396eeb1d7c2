//! WebSocket connector backed by tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::link::{CloseReason, Connector, Incoming, Link, Outgoing, TransportError};

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens `ws://` / `wss://` sockets.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
            .with(|out: Outgoing| future::ready(Ok::<_, TransportError>(to_message(out))));

        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(Incoming::Text(text.to_string()))),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Some(Ok(Incoming::Text(text))),
                    Err(_) => {
                        tracing::warn!("Dropping non UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(frame)) => Some(Ok(Incoming::Closed(from_close_frame(frame)))),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
            })
        });

        Ok(Link {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}

fn to_message(out: Outgoing) -> Message {
    match out {
        Outgoing::Text(text) => Message::Text(text.into()),
        Outgoing::Close(reason) => Message::Close(Some(CloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.into(),
        })),
    }
}

fn from_close_frame(frame: Option<CloseFrame>) -> CloseReason {
    frame.map_or_else(
        || CloseReason::new(NO_STATUS_RECEIVED, ""),
        |frame| CloseReason::new(u16::from(frame.code), frame.reason.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, sync::Arc};

    use axum::{
        Router,
        extract::{
            Path, WebSocketUpgrade,
            ws::{Message as AxumMessage, WebSocket},
        },
        response::IntoResponse,
        routing::get,
    };
    use orbit_core::{ConnectionStatus, RealtimeSettings};
    use tokio::sync::mpsc;

    use super::*;
    use crate::ConnectionManager;

    /// Minimal notification endpoint: greets, answers pings, reports close codes.
    async fn serve(closes: mpsc::UnboundedSender<Option<u16>>) -> SocketAddr {
        let app = Router::new().route(
            "/ws/{user_id}",
            get(
                move |ws: WebSocketUpgrade, Path(user_id): Path<String>| async move {
                    ws.on_upgrade(move |socket| handle(socket, user_id, closes))
                        .into_response()
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    async fn handle(
        mut socket: WebSocket,
        user_id: String,
        closes: mpsc::UnboundedSender<Option<u16>>,
    ) {
        let hello = serde_json::json!({
            "type": "connection_established",
            "message": "Connected",
            "user_id": user_id,
        });
        let _ = socket
            .send(AxumMessage::Text(hello.to_string().into()))
            .await;

        while let Some(Ok(msg)) = socket.recv().await {
            match msg {
                AxumMessage::Text(text) => {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    if value["type"] == "ping" {
                        let pong = serde_json::json!({"type": "pong"});
                        let _ = socket.send(AxumMessage::Text(pong.to_string().into())).await;
                    }
                }
                AxumMessage::Close(frame) => {
                    let _ = closes.send(frame.map(|f| f.code));
                    return;
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_manager_over_real_socket() {
        let (close_tx, mut closes) = mpsc::unbounded_channel();
        let addr = serve(close_tx).await;

        let settings = RealtimeSettings {
            ws_base_url: format!("ws://{addr}"),
            ..RealtimeSettings::default()
        };
        let manager = ConnectionManager::spawn(
            &settings,
            Arc::new(WebSocketConnector::new()),
            Some("u-1".to_string()),
        );
        let mut messages = manager.subscribe();
        manager.connect();

        let hello = messages.recv().await.unwrap();
        assert_eq!(hello.message.msg_type, "connection_established");
        assert_eq!(hello.message.extra["user_id"], "u-1");
        assert!(manager.is_connected());

        manager.send_heartbeat();
        let pong = messages.recv().await.unwrap();
        assert_eq!(pong.message.msg_type, "pong");

        manager.disconnect();
        assert_eq!(closes.recv().await.unwrap(), Some(1000));
        let mut status = manager.watch_status();
        status.wait_for(|s| !s.is_connected()).await.unwrap();
        assert_eq!(manager.status(), ConnectionStatus::default());
    }

    #[tokio::test]
    async fn test_refused_connection_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WebSocketConnector::new()
            .connect(&format!("ws://{addr}/ws/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[test]
    fn test_close_frame_mapping() {
        assert_eq!(from_close_frame(None).code, NO_STATUS_RECEIVED);
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".to_string().into(),
        };
        assert!(from_close_frame(Some(frame)).is_normal());
    }
}
