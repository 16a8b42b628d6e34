//! Gateway opcodes, event names, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::chat_message::ChatMessageType;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_CONNECT: u8 = 2;
pub const OP_SUBSCRIBE: u8 = 3;
pub const OP_UNSUBSCRIBE: u8 = 4;
pub const OP_SEND: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;
pub const OP_DEBUG_SEND: u8 = 7;
pub const OP_ERROR: u8 = 8;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }

    /// Build an ERROR message (op=8). The connection stays open.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            op: OP_ERROR,
            t: None,
            s: None,
            d: serde_json::json!({ "code": code, "message": message }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

/// First frame of every connection.
#[derive(Debug, Deserialize)]
pub struct ConnectPayload {
    /// `Bearer <token>`, as in the HTTP `Authorization` header.
    pub authorization: String,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
pub struct RoomPayload {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendPayload {
    pub room_id: String,
    #[serde(rename = "type", default = "text_type")]
    pub message_type: ChatMessageType,
    /// Message text, or base64 image bytes for `IMAGE`.
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

fn text_type() -> ChatMessageType {
    ChatMessageType::Text
}

// ---------------------------------------------------------------------------
// Dispatch event names
// ---------------------------------------------------------------------------

pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const SUBSCRIBED: &'static str = "SUBSCRIBED";
    pub const UNSUBSCRIBED: &'static str = "UNSUBSCRIBED";
    pub const MESSAGE_CREATE: &'static str = "MESSAGE_CREATE";
    pub const ROOM_UPDATE: &'static str = "ROOM_UPDATE";
    pub const PARTICIPANT_UPDATE: &'static str = "PARTICIPANT_UPDATE";
    pub const STATUS_UPDATE: &'static str = "STATUS_UPDATE";
    pub const INVITATION_RECEIVED: &'static str = "INVITATION_RECEIVED";
}
