use crate::directory::{ParticipantRepository, RoomRepository};
use crate::error::{ApiError, ErrorKind};
use crate::models::participant::Participant;
use crate::models::room::Room;

/// Load a room by id, finished or not.
pub async fn load_room(rooms: &dyn RoomRepository, room_id: &str) -> Result<Room, ApiError> {
    rooms
        .find_room(room_id)
        .await?
        .ok_or_else(|| ErrorKind::RoomNotFound.into())
}

pub fn require_host(room: &Room, user_id: &str) -> Result<(), ApiError> {
    if room.is_host(user_id) {
        Ok(())
    } else {
        Err(ErrorKind::NotHost.into())
    }
}

pub fn require_open(room: &Room) -> Result<(), ApiError> {
    if room.is_finished() {
        Err(ErrorKind::RoomFinished.into())
    } else {
        Ok(())
    }
}

/// Load a room the caller hosts and that has not finished.
pub async fn load_hosted_room(
    rooms: &dyn RoomRepository,
    room_id: &str,
    host_id: &str,
) -> Result<Room, ApiError> {
    let room = load_room(rooms, room_id).await?;
    require_host(&room, host_id)?;
    require_open(&room)?;
    Ok(room)
}

/// The caller's participant row, which must be ACTIVE and not kicked.
pub async fn require_active_participant(
    participants: &dyn ParticipantRepository,
    room_id: &str,
    user_id: &str,
) -> Result<Participant, ApiError> {
    participants
        .find_participant(room_id, user_id)
        .await?
        .filter(Participant::is_active)
        .ok_or_else(|| ErrorKind::NotRoomParticipant.into())
}

/// Any non-kicked row, whatever its connection state. Enough to read the
/// room's chat log.
pub async fn require_member(
    participants: &dyn ParticipantRepository,
    room_id: &str,
    user_id: &str,
) -> Result<Participant, ApiError> {
    participants
        .find_participant(room_id, user_id)
        .await?
        .filter(|p| !p.is_kicked)
        .ok_or_else(|| ErrorKind::NotRoomParticipant.into())
}
