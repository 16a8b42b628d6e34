//! Room life cycle: creation, entry, exit, kicks and host playback commands.
//!
//! Every command re-validates against the directory; concurrent commands
//! from several instances are settled by the directory's conditional
//! updates, not by anything held in this process.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::broker::{publish_event, Broker, Topic};
use crate::directory::Directory;
use crate::error::{ApiError, ErrorKind};
use crate::external::LibraryCatalog;
use crate::gateway::events::EventName;
use crate::guards;
use crate::models::participant::{Admission, Participant};
use crate::models::room::{
    is_valid_play_speed, NewRoom, Room, RoomStatus, DEFAULT_MAX_CAPACITY, DEFAULT_PLAY_SPEED,
    DEFAULT_VOICE,
};
use crate::presence::PresenceStore;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub library_id: String,
    /// Defaults to `"{title} - {author}"`.
    pub name: Option<String>,
    pub voice: Option<String>,
    pub play_speed: Option<f64>,
    pub max_capacity: Option<i32>,
    pub chapter_id: Option<String>,
}

/// Room together with its participant rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomDetail {
    pub room: Room,
    pub participants: Vec<Participant>,
    pub active_count: i64,
}

#[derive(Clone)]
pub struct RoomService {
    directory: Directory,
    catalog: Arc<dyn LibraryCatalog>,
    presence: PresenceStore,
    broker: Arc<dyn Broker>,
}

impl RoomService {
    pub fn new(
        directory: Directory,
        catalog: Arc<dyn LibraryCatalog>,
        presence: PresenceStore,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            directory,
            catalog,
            presence,
            broker,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        self.directory.rooms.list_open_rooms().await
    }

    pub async fn get_room(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        let room = guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        let participants = self.directory.participants.list_participants(room_id).await?;
        let active_count = participants.iter().filter(|p| p.is_active()).count() as i64;
        Ok(RoomDetail {
            room,
            participants,
            active_count,
        })
    }

    pub async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, ApiError> {
        guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        self.directory.participants.list_participants(room_id).await
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    pub async fn create_room(&self, host_id: &str, req: CreateRoomRequest) -> Result<Room, ApiError> {
        let play_speed = req.play_speed.unwrap_or(DEFAULT_PLAY_SPEED);
        if !is_valid_play_speed(play_speed) {
            return Err(ErrorKind::InvalidPlaySpeed.into());
        }
        let max_capacity = req.max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY);
        if max_capacity < 1 {
            return Err(ApiError::bad_request("max_capacity must be at least 1"));
        }

        if self
            .directory
            .rooms
            .find_open_room_by_host(host_id)
            .await?
            .is_some()
        {
            return Err(ErrorKind::RoomAlreadyExists.into());
        }

        let book = self
            .catalog
            .find_library_book(&req.library_id)
            .await?
            .filter(|book| book.owner_id == host_id)
            .ok_or(ErrorKind::LibraryNotFound)?;

        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| book.default_room_name());
        let voice = req
            .voice
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());

        let (room, _host) = self
            .directory
            .rooms
            .create_room_with_host(
                NewRoom {
                    host_id: host_id.to_string(),
                    library_id: book.library_id,
                    book_id: book.book_id,
                    name,
                    voice,
                    play_speed,
                    max_capacity,
                    current_chapter_id: req.chapter_id,
                },
                Utc::now(),
            )
            .await?;

        tracing::info!(room_id = %room.id, %host_id, "room created");
        self.mark_reading(host_id).await;
        Ok(room)
    }

    /// Enter, or re-enter after a disconnect or exit.
    pub async fn enter_room(&self, room_id: &str, user_id: &str) -> Result<Participant, ApiError> {
        let room = guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        guards::require_open(&room)?;

        let existing = self
            .directory
            .participants
            .find_participant(room_id, user_id)
            .await?;
        match &existing {
            Some(p) if p.is_kicked => return Err(ErrorKind::KickedUser.into()),
            Some(p) if p.is_active() => return Ok(p.clone()),
            Some(_) => {}
            None if room.status == RoomStatus::Playing => {
                return Err(ErrorKind::RoomIsPlaying.into());
            }
            None => {}
        }

        // The status read above is only a fast path; admission re-checks it
        // under the room lock.

        let participant = match self
            .directory
            .participants
            .admit_participant(room_id, user_id, room.max_capacity, Utc::now())
            .await?
        {
            Admission::Admitted(p) => p,
            Admission::Full => return Err(ErrorKind::RoomIsFull.into()),
            Admission::Kicked => return Err(ErrorKind::KickedUser.into()),
            Admission::Playing => return Err(ErrorKind::RoomIsPlaying.into()),
            Admission::Finished => return Err(ErrorKind::RoomFinished.into()),
        };

        tracing::info!(%room_id, %user_id, reconnect = existing.is_some(), "participant entered");
        self.publish_participant(&participant).await;
        self.mark_reading(user_id).await;
        Ok(participant)
    }

    /// A host leaving ends the room for everyone.
    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<(), ApiError> {
        let room = guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
        guards::require_open(&room)?;

        if room.is_host(user_id) {
            self.finish(&room).await?;
            return Ok(());
        }

        let participant = self
            .directory
            .participants
            .exit_participant(room_id, user_id, Utc::now())
            .await?
            .ok_or(ErrorKind::ParticipantNotFound)?;

        tracing::info!(%room_id, %user_id, "participant left");
        self.publish_participant(&participant).await;
        self.mark_online(user_id).await;
        Ok(())
    }

    pub async fn kick_user(&self, room_id: &str, host_id: &str, target_id: &str) -> Result<Participant, ApiError> {
        guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        if target_id == host_id {
            return Err(ApiError::bad_request("The host cannot kick themselves"));
        }

        let participant = self
            .directory
            .participants
            .kick_participant(room_id, target_id, Utc::now())
            .await?
            .ok_or(ErrorKind::ParticipantNotFound)?;

        tracing::info!(%room_id, %host_id, %target_id, "participant kicked");
        self.publish_participant(&participant).await;
        self.mark_online(target_id).await;
        Ok(participant)
    }

    // -----------------------------------------------------------------------
    // Host playback commands
    // -----------------------------------------------------------------------

    pub async fn update_play_speed(&self, room_id: &str, host_id: &str, speed: f64) -> Result<Room, ApiError> {
        guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        if !is_valid_play_speed(speed) {
            return Err(ErrorKind::InvalidPlaySpeed.into());
        }

        let room = self
            .directory
            .rooms
            .update_play_speed(room_id, speed, Utc::now())
            .await?
            .ok_or(ErrorKind::RoomFinished)?;
        self.publish_room(&room).await;
        Ok(room)
    }

    pub async fn update_progress(
        &self,
        room_id: &str,
        host_id: &str,
        chapter_id: Option<&str>,
        position: i64,
    ) -> Result<Room, ApiError> {
        guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        if position < 0 {
            return Err(ErrorKind::InvalidProgress.into());
        }

        let room = self
            .directory
            .rooms
            .update_progress(room_id, chapter_id, position, Utc::now())
            .await?
            .ok_or(ErrorKind::RoomFinished)?;
        self.publish_room(&room).await;
        Ok(room)
    }

    /// WAITING or PAUSED → PLAYING.
    pub async fn start_reading(&self, room_id: &str, host_id: &str) -> Result<Room, ApiError> {
        let room = guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        if room.status == RoomStatus::Playing {
            return Err(ErrorKind::RoomStateConflict.into());
        }
        self.transition(room_id, &RoomStatus::sources_of(RoomStatus::Playing), RoomStatus::Playing)
            .await
    }

    /// Toggle PLAYING ↔ PAUSED.
    pub async fn pause_reading(&self, room_id: &str, host_id: &str) -> Result<Room, ApiError> {
        let room = guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        let next = match room.status {
            RoomStatus::Playing => RoomStatus::Paused,
            RoomStatus::Paused => RoomStatus::Playing,
            RoomStatus::Waiting | RoomStatus::Finished => {
                return Err(ErrorKind::RoomStateConflict.into());
            }
        };
        self.transition(room_id, &[room.status], next).await
    }

    pub async fn finish_reading(&self, room_id: &str, host_id: &str) -> Result<Room, ApiError> {
        let room = guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        self.finish(&room).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn transition(&self, room_id: &str, from: &[RoomStatus], to: RoomStatus) -> Result<Room, ApiError> {
        match self
            .directory
            .rooms
            .transition_room(room_id, from, to, Utc::now())
            .await?
        {
            Some(room) => {
                tracing::info!(%room_id, status = %room.status, "room status changed");
                self.publish_room(&room).await;
                Ok(room)
            }
            // Lost a race with another command; report what the room became.
            None => {
                let current = guards::load_room(self.directory.rooms.as_ref(), room_id).await?;
                guards::require_open(&current)?;
                Err(ErrorKind::RoomStateConflict.into())
            }
        }
    }

    /// FINISHED + soft-delete + reward outbox entry, then tell everyone.
    async fn finish(&self, room: &Room) -> Result<Room, ApiError> {
        let active: Vec<Participant> = self
            .directory
            .participants
            .list_participants(&room.id)
            .await?
            .into_iter()
            .filter(Participant::is_active)
            .collect();

        let finished = self
            .directory
            .rooms
            .finish_room(&room.id, Utc::now())
            .await?
            .ok_or(ErrorKind::RoomFinished)?;

        tracing::info!(room_id = %finished.id, host_id = %finished.host_id, "room finished");
        self.publish_room(&finished).await;
        for participant in &active {
            self.mark_online(&participant.user_id).await;
        }
        Ok(finished)
    }

    async fn publish_room(&self, room: &Room) {
        publish_event(
            self.broker.as_ref(),
            &Topic::chat_room(&room.id),
            EventName::ROOM_UPDATE,
            room,
        )
        .await;
    }

    async fn publish_participant(&self, participant: &Participant) {
        publish_event(
            self.broker.as_ref(),
            &Topic::chat_room(&participant.room_id),
            EventName::PARTICIPANT_UPDATE,
            participant,
        )
        .await;
    }

    async fn mark_reading(&self, user_id: &str) {
        if let Err(e) = self.presence.mark_reading(user_id).await {
            tracing::warn!(error = %e, %user_id, "failed to mark user reading");
        }
    }

    async fn mark_online(&self, user_id: &str) {
        if let Err(e) = self.presence.mark_online(user_id).await {
            tracing::warn!(error = %e, %user_id, "failed to mark user online");
        }
    }
}
