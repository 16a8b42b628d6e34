use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::rooms;
use crate::error::ApiError;

pub const DEFAULT_MAX_CAPACITY: i32 = 8;
pub const MIN_PLAY_SPEED: f64 = 0.5;
pub const MAX_PLAY_SPEED: f64 = 2.0;
pub const DEFAULT_PLAY_SPEED: f64 = 1.0;
pub const DEFAULT_VOICE: &str = "default";

/// Room life-cycle. `Finished` is absorbing and implies soft-deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Paused,
    Finished,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Finished => "FINISHED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WAITING" => Some(Self::Waiting),
            "PLAYING" => Some(Self::Playing),
            "PAUSED" => Some(Self::Paused),
            "FINISHED" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Legal edges: WAITING→PLAYING, PLAYING↔PAUSED, any live state→FINISHED.
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Playing)
                | (Self::Playing, Self::Paused)
                | (Self::Paused, Self::Playing)
                | (Self::Waiting | Self::Playing | Self::Paused, Self::Finished)
        )
    }

    /// States from which `next` may be entered.
    pub fn sources_of(next: RoomStatus) -> Vec<RoomStatus> {
        [Self::Waiting, Self::Playing, Self::Paused, Self::Finished]
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared reading room.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Room {
    pub id: String,
    pub host_id: String,
    pub library_id: String,
    pub book_id: String,
    pub name: String,
    pub voice: String,
    pub play_speed: f64,
    pub max_capacity: i32,
    pub status: RoomStatus,
    pub current_chapter_id: Option<String>,
    pub last_read_position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    pub fn is_finished(&self) -> bool {
        self.status == RoomStatus::Finished || self.deleted_at.is_some()
    }
}

pub fn is_valid_play_speed(speed: f64) -> bool {
    speed.is_finite() && (MIN_PLAY_SPEED..=MAX_PLAY_SPEED).contains(&speed)
}

/// Fields supplied when a room is created; ids and timestamps are assigned
/// by the directory.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub host_id: String,
    pub library_id: String,
    pub book_id: String,
    pub name: String,
    pub voice: String,
    pub play_speed: f64,
    pub max_capacity: i32,
    pub current_chapter_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Database row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = rooms)]
pub struct RoomRow {
    pub id: String,
    pub host_id: String,
    pub library_id: String,
    pub book_id: String,
    pub name: String,
    pub voice: String,
    pub play_speed: f64,
    pub max_capacity: i32,
    pub status: String,
    pub current_chapter_id: Option<String>,
    pub last_read_position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<RoomRow> for Room {
    type Error = ApiError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        let status = RoomStatus::parse(&row.status).ok_or_else(|| {
            tracing::error!(room_id = %row.id, status = %row.status, "unknown room status");
            ApiError::internal("Corrupt room status")
        })?;
        Ok(Room {
            id: row.id,
            host_id: row.host_id,
            library_id: row.library_id,
            book_id: row.book_id,
            name: row.name,
            voice: row.voice,
            play_speed: row.play_speed,
            max_capacity: row.max_capacity,
            status,
            current_chapter_id: row.current_chapter_id,
            last_read_position: row.last_read_position,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

impl From<&Room> for RoomRow {
    fn from(room: &Room) -> Self {
        RoomRow {
            id: room.id.clone(),
            host_id: room.host_id.clone(),
            library_id: room.library_id.clone(),
            book_id: room.book_id.clone(),
            name: room.name.clone(),
            voice: room.voice.clone(),
            play_speed: room.play_speed,
            max_capacity: room.max_capacity,
            status: room.status.as_str().to_string(),
            current_chapter_id: room.current_chapter_id.clone(),
            last_read_position: room.last_read_position,
            created_at: room.created_at,
            updated_at: room.updated_at,
            deleted_at: room.deleted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_life_cycle() {
        use RoomStatus::*;
        assert!(Waiting.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        for live in [Waiting, Playing, Paused] {
            assert!(live.can_transition_to(Finished));
        }

        assert!(!Waiting.can_transition_to(Paused));
        assert!(!Playing.can_transition_to(Waiting));
        assert!(!Paused.can_transition_to(Waiting));
        for next in [Waiting, Playing, Paused, Finished] {
            assert!(!Finished.can_transition_to(next), "FINISHED -> {next}");
        }
    }

    #[test]
    fn sources_of_lists_legal_predecessors() {
        assert_eq!(RoomStatus::sources_of(RoomStatus::Playing), vec![RoomStatus::Waiting, RoomStatus::Paused]);
        assert_eq!(RoomStatus::sources_of(RoomStatus::Paused), vec![RoomStatus::Playing]);
        assert!(RoomStatus::sources_of(RoomStatus::Waiting).is_empty());
    }

    #[test]
    fn play_speed_bounds_are_inclusive() {
        assert!(is_valid_play_speed(0.5));
        assert!(is_valid_play_speed(2.0));
        assert!(is_valid_play_speed(1.25));
        assert!(!is_valid_play_speed(0.4));
        assert!(!is_valid_play_speed(2.1));
        assert!(!is_valid_play_speed(f64::NAN));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [RoomStatus::Waiting, RoomStatus::Playing, RoomStatus::Paused, RoomStatus::Finished] {
            assert_eq!(RoomStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RoomStatus::parse("waiting"), None);
    }
}
