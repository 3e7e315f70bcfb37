//! Chat wire protocol: one JSON event envelope per WebSocket text frame.
//!
//! The event surface mirrors the backend's chat namespace: clients emit
//! `join-user`, `join-appointment`, and `send-message`; the server answers with
//! `joined`, `appointment-joined`, `new-message`, and `error`.

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const JOIN_USER: &str = "join-user";
pub const JOIN_APPOINTMENT: &str = "join-appointment";
pub const SEND_MESSAGE: &str = "send-message";
pub const JOINED: &str = "joined";
pub const APPOINTMENT_JOINED: &str = "appointment-joined";
pub const NEW_MESSAGE: &str = "new-message";
pub const ERROR: &str = "error";

/// Message type tag carried on every message payload.
pub const MESSAGE_TYPE_TEXT: &str = "TEXT";

/// Wire frame: `{ "event": "<name>", "payload": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn join_user(user_id: i64) -> Self {
        Self::new(JOIN_USER, json!({ "userId": user_id }))
    }

    pub fn join_appointment(appointment_id: i64) -> Self {
        Self::new(JOIN_APPOINTMENT, json!({ "appointmentId": appointment_id }))
    }

    pub fn send_message(payload: &SendMessagePayload) -> Self {
        Self::new(
            SEND_MESSAGE,
            serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        )
    }

    pub fn joined(user_id: i64) -> Self {
        Self::new(JOINED, json!({ "userId": user_id }))
    }

    pub fn appointment_joined(appointment_id: i64) -> Self {
        Self::new(APPOINTMENT_JOINED, json!({ "appointmentId": appointment_id }))
    }

    pub fn new_message(record: &MessageRecord) -> Self {
        Self::new(
            NEW_MESSAGE,
            serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR, json!({ "message": message.into() }))
    }

    /// Serialize to the text-frame body.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"error","payload":{"message":"serialize failed"}}"#.to_string())
    }
}

/// Payload for `join-user`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinUserPayload {
    pub user_id: i64,
}

/// Payload for `join-appointment`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAppointmentPayload {
    pub appointment_id: i64,
}

/// Payload for `send-message`. The sender is implied by the socket's prior `join-user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub receiver_id: i64,
    pub appointment_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Full message record carried on `new-message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub appointment_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339 timestamp assigned by the server.
    pub created_at: String,
}

/// Payload for `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_frame_uses_camel_case_and_type_tag() {
        let frame = EventFrame::send_message(&SendMessagePayload {
            receiver_id: 2,
            appointment_id: 1,
            content: "hello".to_string(),
            kind: MESSAGE_TYPE_TEXT.to_string(),
        });
        let v: serde_json::Value = serde_json::from_str(&frame.to_text()).unwrap();
        assert_eq!(v["event"], "send-message");
        assert_eq!(v["payload"]["receiverId"], 2);
        assert_eq!(v["payload"]["appointmentId"], 1);
        assert_eq!(v["payload"]["type"], "TEXT");
    }

    #[test]
    fn message_record_round_trips_wire_names() {
        let text = r#"{
            "id": 7,
            "senderId": 1,
            "receiverId": 2,
            "appointmentId": 1,
            "content": "hi",
            "type": "TEXT",
            "createdAt": "2025-01-01T00:00:00+00:00"
        }"#;
        let record: MessageRecord = serde_json::from_str(text).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.sender_id, 1);
        assert_eq!(record.kind, "TEXT");
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["senderId"], 1);
        assert_eq!(back["createdAt"], "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn frame_without_payload_defaults_to_null() {
        let frame: EventFrame = serde_json::from_str(r#"{"event":"joined"}"#).unwrap();
        assert_eq!(frame.event, "joined");
        assert!(frame.payload.is_null());
    }
}
