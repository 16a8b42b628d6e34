use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::participants;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Active,
    Disconnected,
    Exited,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Disconnected => "DISCONNECTED",
            Self::Exited => "EXITED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "DISCONNECTED" => Some(Self::Disconnected),
            "EXITED" => Some(Self::Exited),
            _ => None,
        }
    }
}

/// Membership of one user in one room. Never hard-deleted; a kicked row can
/// never become `Active` again.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Participant {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub is_kicked: bool,
    pub connection_status: ConnectionStatus,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.connection_status == ConnectionStatus::Active && !self.is_kicked
    }

    /// Counts against capacity. A dropped connection keeps its seat until
    /// the user exits or is kicked.
    pub fn holds_seat(&self) -> bool {
        !self.is_kicked && self.connection_status != ConnectionStatus::Exited
    }
}

/// Result of trying to make a user an active participant.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The row is (now) ACTIVE.
    Admitted(Participant),
    /// Activating would exceed the room's capacity.
    Full,
    /// The user was kicked from this room.
    Kicked,
    /// Newcomers are turned away once playback has started.
    Playing,
    /// The room finished before the admission took its lock.
    Finished,
}

// ---------------------------------------------------------------------------
// Database row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = participants)]
pub struct ParticipantRow {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub is_kicked: bool,
    pub connection_status: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = ApiError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        let connection_status = ConnectionStatus::parse(&row.connection_status).ok_or_else(|| {
            tracing::error!(participant_id = %row.id, status = %row.connection_status, "unknown connection status");
            ApiError::internal("Corrupt participant status")
        })?;
        Ok(Participant {
            id: row.id,
            room_id: row.room_id,
            user_id: row.user_id,
            joined_at: row.joined_at,
            is_kicked: row.is_kicked,
            connection_status,
            updated_at: row.updated_at,
        })
    }
}

impl From<&Participant> for ParticipantRow {
    fn from(p: &Participant) -> Self {
        ParticipantRow {
            id: p.id.clone(),
            room_id: p.room_id.clone(),
            user_id: p.user_id.clone(),
            joined_at: p.joined_at,
            is_kicked: p.is_kicked,
            connection_status: p.connection_status.as_str().to_string(),
            updated_at: p.updated_at,
        }
    }
}
