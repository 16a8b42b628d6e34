//! Persist-then-publish chat relay.
//!
//! A message is durable once `insert_message` returns; the broker publish
//! that follows is best-effort and never rolls the message back. Clients
//! that miss a live event recover it from history, which is ordered by the
//! snowflake id.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use readalong_common::{snowflake_created_at, SnowflakeGenerator};

use crate::broker::{publish_event, Broker, Topic};
use crate::directory::Directory;
use crate::error::{ApiError, ErrorKind};
use crate::external::blob::{chat_image_key, BlobStore};
use crate::gateway::events::EventName;
use crate::guards;
use crate::models::chat_message::{ChatMessage, ChatMessageType, HISTORY_PAGE_SIZE, MAX_TEXT_LENGTH};

const DEFAULT_IMAGE_TYPE: &str = "image/png";

/// A chat send as it arrives from a client.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message_type: ChatMessageType,
    /// Text, or base64 image bytes.
    pub content: String,
    pub content_type: Option<String>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message_type: ChatMessageType::Text,
            content: content.into(),
            content_type: None,
        }
    }
}

#[derive(Clone)]
pub struct ChatRelay {
    directory: Directory,
    broker: Arc<dyn Broker>,
    blobs: Arc<dyn BlobStore>,
    snowflake: Arc<SnowflakeGenerator>,
    debug_enabled: bool,
}

impl ChatRelay {
    pub fn new(
        directory: Directory,
        broker: Arc<dyn Broker>,
        blobs: Arc<dyn BlobStore>,
        snowflake: Arc<SnowflakeGenerator>,
        debug_enabled: bool,
    ) -> Self {
        Self {
            directory,
            broker,
            blobs,
            snowflake,
            debug_enabled,
        }
    }

    pub async fn send(&self, user_id: &str, room_id: &str, outgoing: OutgoingMessage) -> Result<ChatMessage, ApiError> {
        let room = guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        guards::require_active_participant(self.directory.participants.as_ref(), room_id, user_id).await?;
        guards::require_open(&room)?;

        let content = match outgoing.message_type {
            ChatMessageType::Text => validate_text(&outgoing.content)?,
            ChatMessageType::Image => self.store_image(room_id, &outgoing).await?,
        };

        let id = self.snowflake.generate();
        let message = self
            .directory
            .chat
            .insert_message(ChatMessage {
                id,
                room_id: room_id.to_string(),
                sender_id: user_id.to_string(),
                message_type: outgoing.message_type,
                content,
                created_at: snowflake_created_at(id),
            })
            .await?;

        tracing::debug!(message_id = message.id, %room_id, %user_id, "chat message stored");
        self.publish(&message).await;
        Ok(message)
    }

    /// Publish a text message without storing it. Local and dev only.
    pub async fn debug_send(&self, user_id: &str, room_id: &str, text: &str) -> Result<ChatMessage, ApiError> {
        if !self.debug_enabled {
            return Err(ApiError::forbidden("Debug chat is disabled"));
        }

        let id = self.snowflake.generate();
        let message = ChatMessage {
            id,
            room_id: room_id.to_string(),
            sender_id: user_id.to_string(),
            message_type: ChatMessageType::Text,
            content: validate_text(text)?,
            created_at: snowflake_created_at(id),
        };
        self.publish(&message).await;
        Ok(message)
    }

    /// The newest page of the room's chat, oldest first. Members only.
    pub async fn history(&self, user_id: &str, room_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        guards::require_member(self.directory.participants.as_ref(), room_id, user_id).await?;
        self.directory
            .chat
            .recent_messages(room_id, HISTORY_PAGE_SIZE)
            .await
    }

    /// The page strictly older than `before_id`, oldest first.
    pub async fn older_history(
        &self,
        user_id: &str,
        room_id: &str,
        before_id: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        guards::require_member(self.directory.participants.as_ref(), room_id, user_id).await?;
        self.directory
            .chat
            .messages_before(room_id, before_id, HISTORY_PAGE_SIZE)
            .await
    }

    async fn store_image(&self, room_id: &str, outgoing: &OutgoingMessage) -> Result<String, ApiError> {
        let content_type = outgoing
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_TYPE);
        if !content_type.starts_with("image/") {
            return Err(ErrorKind::InvalidChatMessage.into());
        }

        let bytes = STANDARD
            .decode(outgoing.content.trim())
            .map_err(|_| ApiError::from(ErrorKind::InvalidChatMessage))?;
        if bytes.is_empty() {
            return Err(ErrorKind::InvalidChatMessage.into());
        }

        let key = chat_image_key(room_id, &bytes);
        self.blobs.put(&key, content_type, bytes).await
    }

    async fn publish(&self, message: &ChatMessage) {
        publish_event(
            self.broker.as_ref(),
            &Topic::chat_room(&message.room_id),
            EventName::MESSAGE_CREATE,
            message,
        )
        .await;
    }
}

fn validate_text(content: &str) -> Result<String, ApiError> {
    let text = content.trim();
    if text.is_empty() || text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ErrorKind::InvalidChatMessage.into());
    }
    Ok(text.to_string())
}
