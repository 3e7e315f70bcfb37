//! In-process stub chat server implementing the fixed chat event contract.
//!
//! Lets the probe run (and the integration tests assert delivery) without the
//! real backend. Appointment rooms are broadcast channels; `new-message` is
//! echoed to every room member, sender included, matching the backend's
//! room-broadcast semantics.

use crate::config::{namespace_path, Config};
use crate::protocol::{
    self, EventFrame, JoinAppointmentPayload, JoinUserPayload, MessageRecord, SendMessagePayload,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Shared state: appointment rooms and the message id counter.
#[derive(Clone)]
pub struct StubState {
    rooms: Arc<Mutex<HashMap<i64, broadcast::Sender<String>>>>,
    next_message_id: Arc<AtomicI64>,
    port: u16,
}

impl StubState {
    pub fn new(port: u16) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            next_message_id: Arc::new(AtomicI64::new(1)),
            port,
        }
    }

    /// Sender for an appointment room, created on first use.
    async fn room(&self, appointment_id: i64) -> broadcast::Sender<String> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(appointment_id)
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

/// Run the stub server; binds to config.server.host:port. Shuts down on SIGINT/SIGTERM.
pub async fn run_server(config: Config) -> Result<()> {
    let state = StubState::new(config.server.port);
    let app = Router::new()
        .route("/", get(health_http))
        .route(&namespace_path(&config), get(ws_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("stub chat server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("stub chat server exited")?;
    log::info!("stub chat server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<StubState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "service": "stub-chat",
        "port": state.port,
    }))
}

/// GET on the chat namespace upgrades to WebSocket.
async fn ws_handler(State(state): State<StubState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pending forever when the socket has not joined an appointment room yet.
async fn recv_room(
    rx: &mut Option<broadcast::Receiver<String>>,
) -> Result<String, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_socket(mut socket: WebSocket, state: StubState) {
    // Per-socket session: the user that joined, and the room subscription.
    let mut user_id: Option<i64> = None;
    let mut room_rx: Option<broadcast::Receiver<String>> = None;

    loop {
        tokio::select! {
            biased;

            broadcast_text = recv_room(&mut room_rx) => {
                match broadcast_text {
                    Ok(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} room messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(frame) = serde_json::from_str::<EventFrame>(&text) else {
                    if send_error(&mut socket, "malformed event frame").await.is_err() {
                        break;
                    }
                    continue;
                };

                match frame.event.as_str() {
                    protocol::JOIN_USER => {
                        let Ok(p) = serde_json::from_value::<JoinUserPayload>(frame.payload) else {
                            if send_error(&mut socket, "invalid join-user payload").await.is_err() {
                                break;
                            }
                            continue;
                        };
                        user_id = Some(p.user_id);
                        log::debug!("user {} joined chat", p.user_id);
                        let reply = EventFrame::joined(p.user_id).to_text();
                        if socket.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                    protocol::JOIN_APPOINTMENT => {
                        let Ok(p) = serde_json::from_value::<JoinAppointmentPayload>(frame.payload) else {
                            if send_error(&mut socket, "invalid join-appointment payload").await.is_err() {
                                break;
                            }
                            continue;
                        };
                        room_rx = Some(state.room(p.appointment_id).await.subscribe());
                        log::debug!(
                            "user {:?} joined appointment {}",
                            user_id,
                            p.appointment_id
                        );
                        let reply = EventFrame::appointment_joined(p.appointment_id).to_text();
                        if socket.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                    protocol::SEND_MESSAGE => {
                        let Ok(p) = serde_json::from_value::<SendMessagePayload>(frame.payload) else {
                            if send_error(&mut socket, "invalid send-message payload").await.is_err() {
                                break;
                            }
                            continue;
                        };
                        let Some(sender_id) = user_id else {
                            if send_error(&mut socket, "join-user required before send-message").await.is_err() {
                                break;
                            }
                            continue;
                        };
                        let record = MessageRecord {
                            id: state.next_message_id.fetch_add(1, Ordering::SeqCst),
                            sender_id,
                            receiver_id: p.receiver_id,
                            appointment_id: p.appointment_id,
                            content: p.content,
                            kind: p.kind,
                            created_at: chrono::Utc::now().to_rfc3339(),
                        };
                        let room = state.room(record.appointment_id).await;
                        // No subscribers is fine; delivery is best-effort.
                        let _ = room.send(EventFrame::new_message(&record).to_text());
                    }
                    other => {
                        log::debug!("unknown event from client: {}", other);
                        if send_error(&mut socket, format!("unknown event: {}", other)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn send_error(socket: &mut WebSocket, message: impl Into<String>) -> Result<(), axum::Error> {
    socket
        .send(Message::Text(EventFrame::error(message).to_text()))
        .await
}
