//! WebSocket chat client used by the scripted probe.
//!
//! `connect` opens the socket and spawns a writer task (fed by an mpsc channel)
//! and a reader task that decodes event frames into [`ServerEvent`]s for the
//! caller. The handle is cheap to clone; all clones share the same connection.

use crate::protocol::{self, ErrorPayload, EventFrame, MessageRecord, SendMessagePayload};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connecting to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("connection closed")]
    Closed,
}

/// Inbound events surfaced by the reader task. Unknown events are logged at
/// debug level and dropped; the probe does not act on anything it receives.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// `joined` acknowledgement (payload logged as-is).
    Joined(serde_json::Value),
    /// `appointment-joined` acknowledgement.
    AppointmentJoined(serde_json::Value),
    /// `new-message` with the full message record.
    NewMessage(MessageRecord),
    /// `error` event from the server.
    ServerError(String),
    /// Socket closed or the read side failed. Always the last event.
    Disconnected,
}

#[derive(Clone)]
pub struct ChatClient {
    outbound: mpsc::Sender<Message>,
    connected: Arc<AtomicBool>,
    connection_id: String,
}

impl ChatClient {
    /// Connect to the chat namespace and spawn the reader/writer tasks.
    /// Returns the handle and the inbound event stream.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::Connect {
                url: url.to_string(),
                source: e,
            })?;
        let (mut sink, mut stream) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);
        let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(64);
        let connected = Arc::new(AtomicBool::new(true));
        // Plain WebSockets have no server-assigned socket id; label the
        // connection locally for the status monitor and logs.
        let connection_id = uuid::Uuid::new_v4().to_string();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() {
                    break;
                }
                if is_close {
                    let _ = sink.flush().await;
                    break;
                }
            }
        });

        let flag = connected.clone();
        let id = connection_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        log::debug!("ws read error on {}: {}", id, e);
                        break;
                    }
                };
                match msg {
                    Message::Text(text) => {
                        let Ok(frame) = serde_json::from_str::<EventFrame>(&text) else {
                            log::debug!("unparseable frame on {}: {}", id, text);
                            continue;
                        };
                        let event = match frame.event.as_str() {
                            protocol::JOINED => ServerEvent::Joined(frame.payload),
                            protocol::APPOINTMENT_JOINED => {
                                ServerEvent::AppointmentJoined(frame.payload)
                            }
                            protocol::NEW_MESSAGE => {
                                match serde_json::from_value::<MessageRecord>(frame.payload) {
                                    Ok(record) => ServerEvent::NewMessage(record),
                                    Err(e) => {
                                        log::warn!("malformed new-message on {}: {}", id, e);
                                        continue;
                                    }
                                }
                            }
                            protocol::ERROR => {
                                let message = serde_json::from_value::<ErrorPayload>(frame.payload)
                                    .map(|p| p.message)
                                    .unwrap_or_else(|_| "unknown error".to_string());
                                ServerEvent::ServerError(message)
                            }
                            other => {
                                log::debug!("ignoring event {:?} on {}", other, id);
                                continue;
                            }
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            flag.store(false, Ordering::SeqCst);
            let _ = event_tx.send(ServerEvent::Disconnected).await;
        });

        Ok((
            Self {
                outbound: out_tx,
                connected,
                connection_id,
            },
            event_rx,
        ))
    }

    /// Local label for this connection.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// True until the reader observes close or a read error, or `close` is called.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, frame: EventFrame) -> Result<(), ClientError> {
        self.outbound
            .send(Message::Text(frame.to_text()))
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub async fn emit_join_user(&self, user_id: i64) -> Result<(), ClientError> {
        self.emit(EventFrame::join_user(user_id)).await
    }

    pub async fn emit_join_appointment(&self, appointment_id: i64) -> Result<(), ClientError> {
        self.emit(EventFrame::join_appointment(appointment_id)).await
    }

    pub async fn emit_send_message(&self, payload: SendMessagePayload) -> Result<(), ClientError> {
        self.emit(EventFrame::send_message(&payload)).await
    }

    /// Send a Close frame and stop the writer. Idempotent.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Message::Close(None)).await;
    }
}
