use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::chat_messages;
use crate::error::ApiError;

/// Page size for recent and older history reads.
pub const HISTORY_PAGE_SIZE: i64 = 50;

/// Upper bound on text message length, in characters.
pub const MAX_TEXT_LENGTH: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMessageType {
    Text,
    Image,
}

impl ChatMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TEXT" => Some(Self::Text),
            "IMAGE" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A persisted chat message. For images `content` is the blob URL.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChatMessage {
    #[serde(serialize_with = "super::serialize_id_str")]
    #[schema(value_type = String)]
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct ChatMessageRow {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub message_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = ApiError;

    fn try_from(row: ChatMessageRow) -> Result<Self, Self::Error> {
        let message_type = ChatMessageType::parse(&row.message_type).ok_or_else(|| {
            tracing::error!(message_id = row.id, kind = %row.message_type, "unknown chat message type");
            ApiError::internal("Corrupt chat message type")
        })?;
        Ok(ChatMessage {
            id: row.id,
            room_id: row.room_id,
            sender_id: row.sender_id,
            message_type,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

impl From<&ChatMessage> for ChatMessageRow {
    fn from(m: &ChatMessage) -> Self {
        ChatMessageRow {
            id: m.id,
            room_id: m.room_id.clone(),
            sender_id: m.sender_id.clone(),
            message_type: m.message_type.as_str().to_string(),
            content: m.content.clone(),
            created_at: m.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_serializes_as_string() {
        let msg = ChatMessage {
            id: 9_007_199_254_740_993,
            room_id: "room_1".into(),
            sender_id: "usr_1".into(),
            message_type: ChatMessageType::Text,
            content: "hi".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["id"], "9007199254740993");
        assert_eq!(json["type"], "TEXT");
    }
}
