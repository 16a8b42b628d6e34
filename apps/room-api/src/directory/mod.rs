//! Session directory: the durable record of rooms, participants,
//! invitations and the chat log.
//!
//! Each aggregate has its own repository trait. Every mutation is a named
//! method that returns the updated struct; there is no implicit dirty
//! tracking. Conditional updates (`transition_room`, `resolve_invitation`,
//! `admit_participant`) are compare-and-set so racing commands from several
//! instances cannot move a row along an illegal edge.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::chat_message::ChatMessage;
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::participant::{Admission, Participant};
use crate::models::room::{NewRoom, Room, RoomStatus};

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, ApiError>;

    /// The host's room that has not finished yet, if any.
    async fn find_open_room_by_host(&self, host_id: &str) -> Result<Option<Room>, ApiError>;

    /// Rooms that have not finished, newest first.
    async fn list_open_rooms(&self) -> Result<Vec<Room>, ApiError>;

    /// Insert the room and its host's ACTIVE participant in one unit of work.
    ///
    /// Fails with `ROOM_ALREADY_EXISTS` when the host already has an open room.
    async fn create_room_with_host(
        &self,
        new_room: NewRoom,
        now: DateTime<Utc>,
    ) -> Result<(Room, Participant), ApiError>;

    /// `None` when the room is missing or finished.
    async fn update_play_speed(
        &self,
        room_id: &str,
        play_speed: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError>;

    /// `None` when the room is missing or finished.
    async fn update_progress(
        &self,
        room_id: &str,
        chapter_id: Option<&str>,
        position: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError>;

    /// Move the room to `to` only if its current status is one of `from`.
    /// Returns `None` when the guard did not match.
    async fn transition_room(
        &self,
        room_id: &str,
        from: &[RoomStatus],
        to: RoomStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError>;

    /// Mark the room FINISHED, soft-delete it and record a reward outbox entry
    /// for its non-kicked participants, atomically. `None` if it had already
    /// finished.
    async fn finish_room(&self, room_id: &str, now: DateTime<Utc>) -> Result<Option<Room>, ApiError>;
}

#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn find_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, ApiError>;

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, ApiError>;

    /// Non-kicked rows that are ACTIVE or DISCONNECTED.
    async fn count_seated(&self, room_id: &str) -> Result<i64, ApiError>;

    /// Make the user an ACTIVE participant, creating the row if needed.
    ///
    /// Runs under the room's lock, re-reading its status there. A DISCONNECTED
    /// row reclaims its own seat; an EXITED row or a newcomer needs a free one,
    /// so seated rows never exceed `max_capacity`. Newcomers are refused while
    /// PLAYING. Kicked rows are never touched.
    async fn admit_participant(
        &self,
        room_id: &str,
        user_id: &str,
        max_capacity: i32,
        now: DateTime<Utc>,
    ) -> Result<Admission, ApiError>;

    /// Personal exit. `None` when the user has no row in this room.
    async fn exit_participant(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Participant>, ApiError>;

    /// Permanently kick. `None` when the user has no row in this room.
    async fn kick_participant(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Participant>, ApiError>;

    /// Flip every ACTIVE row of the user to DISCONNECTED; returns those rows.
    async fn disconnect_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Participant>, ApiError>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn find_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, ApiError>;

    /// The PENDING invitation for (room, receiver), stale or not.
    async fn find_pending_invitation(
        &self,
        room_id: &str,
        receiver_id: &str,
    ) -> Result<Option<Invitation>, ApiError>;

    /// Fails with `ALREADY_INVITED` when a PENDING invitation for the same
    /// (room, receiver) exists.
    async fn create_invitation(
        &self,
        room_id: &str,
        sender_id: &str,
        receiver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ApiError>;

    /// Move a PENDING invitation to `to`. `None` when it was no longer PENDING.
    async fn resolve_invitation(
        &self,
        invitation_id: &str,
        to: InvitationStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, ApiError>;

    async fn list_received(&self, receiver_id: &str) -> Result<Vec<Invitation>, ApiError>;

    async fn list_sent(&self, sender_id: &str) -> Result<Vec<Invitation>, ApiError>;
}

#[async_trait]
pub trait ChatLogRepository: Send + Sync {
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage, ApiError>;

    /// The newest `limit` messages of the room, oldest first.
    async fn recent_messages(&self, room_id: &str, limit: i64) -> Result<Vec<ChatMessage>, ApiError>;

    /// Up to `limit` messages with id strictly below `before_id`, oldest first.
    async fn messages_before(
        &self,
        room_id: &str,
        before_id: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError>;
}

/// Handles to every repository, shared by the services.
#[derive(Clone)]
pub struct Directory {
    pub rooms: Arc<dyn RoomRepository>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub chat: Arc<dyn ChatLogRepository>,
}

impl Directory {
    /// Wire every repository to a single backing store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: RoomRepository + ParticipantRepository + InvitationRepository + ChatLogRepository + 'static,
    {
        Self {
            rooms: store.clone(),
            participants: store.clone(),
            invitations: store.clone(),
            chat: store,
        }
    }
}
