use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Domain error kinds raised by room, invitation, chat and presence commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RoomNotFound,
    RoomAlreadyExists,
    RoomIsFull,
    RoomIsPlaying,
    RoomFinished,
    RoomStateConflict,
    NotHost,
    KickedUser,
    ParticipantNotFound,
    NotRoomParticipant,
    InvalidPlaySpeed,
    InvalidProgress,
    InvalidChatMessage,
    LibraryNotFound,
    InvitationNotFound,
    InvitationExpired,
    NotYourInvitation,
    AlreadyInvited,
    InvitationNotAllowedPlaying,
    InvitationNotAllowedFull,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::RoomAlreadyExists => "ROOM_ALREADY_EXISTS",
            Self::RoomIsFull => "ROOM_IS_FULL",
            Self::RoomIsPlaying => "ROOM_IS_PLAYING",
            Self::RoomFinished => "ROOM_FINISHED",
            Self::RoomStateConflict => "ROOM_STATE_CONFLICT",
            Self::NotHost => "NOT_HOST",
            Self::KickedUser => "KICKED_USER",
            Self::ParticipantNotFound => "PARTICIPANT_NOT_FOUND",
            Self::NotRoomParticipant => "NOT_ROOM_PARTICIPANT",
            Self::InvalidPlaySpeed => "INVALID_PLAY_SPEED",
            Self::InvalidProgress => "INVALID_PROGRESS",
            Self::InvalidChatMessage => "INVALID_CHAT_MESSAGE",
            Self::LibraryNotFound => "LIBRARY_NOT_FOUND",
            Self::InvitationNotFound => "INVITATION_NOT_FOUND",
            Self::InvitationExpired => "INVITATION_EXPIRED",
            Self::NotYourInvitation => "NOT_YOUR_INVITATION",
            Self::AlreadyInvited => "ALREADY_INVITED",
            Self::InvitationNotAllowedPlaying => "INVITATION_NOT_ALLOWED_PLAYING",
            Self::InvitationNotAllowedFull => "INVITATION_NOT_ALLOWED_FULL",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::RoomNotFound
            | Self::ParticipantNotFound
            | Self::LibraryNotFound
            | Self::InvitationNotFound => StatusCode::NOT_FOUND,
            Self::NotHost
            | Self::KickedUser
            | Self::NotRoomParticipant
            | Self::NotYourInvitation => StatusCode::FORBIDDEN,
            Self::InvalidPlaySpeed | Self::InvalidProgress | Self::InvalidChatMessage => {
                StatusCode::BAD_REQUEST
            }
            Self::InvitationExpired => StatusCode::GONE,
            Self::RoomAlreadyExists
            | Self::RoomIsFull
            | Self::RoomIsPlaying
            | Self::RoomFinished
            | Self::RoomStateConflict
            | Self::AlreadyInvited
            | Self::InvitationNotAllowedPlaying
            | Self::InvitationNotAllowedFull => StatusCode::CONFLICT,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::RoomNotFound => "Room not found",
            Self::RoomAlreadyExists => "You already host a room that has not finished",
            Self::RoomIsFull => "Room is full",
            Self::RoomIsPlaying => "Reading has already started in this room",
            Self::RoomFinished => "Room has finished",
            Self::RoomStateConflict => "Room is not in a state that allows this action",
            Self::NotHost => "Only the host can do this",
            Self::KickedUser => "You were removed from this room",
            Self::ParticipantNotFound => "Participant not found",
            Self::NotRoomParticipant => "You are not an active participant of this room",
            Self::InvalidPlaySpeed => "Play speed must be between 0.5 and 2.0",
            Self::InvalidProgress => "Reading progress is invalid",
            Self::InvalidChatMessage => "Chat message is invalid",
            Self::LibraryNotFound => "Library entry not found",
            Self::InvitationNotFound => "Invitation not found",
            Self::InvitationExpired => "Invitation has expired or was already answered",
            Self::NotYourInvitation => "This invitation was sent to someone else",
            Self::AlreadyInvited => "User already has a pending invitation to this room",
            Self::InvitationNotAllowedPlaying => "Cannot invite while reading is in progress",
            Self::InvitationNotAllowedFull => "Cannot invite into a full room",
        }
    }
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED".to_string(),
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "FORBIDDEN".to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }

    /// Whether this error carries the given domain kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.code == kind.code()
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            status: kind.status(),
            code: kind.code().to_string(),
            message: kind.message().to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::internal("An internal error occurred")
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for ApiError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::internal("An internal error occurred")
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!(?err, "redis error");
        Self::internal("An internal error occurred")
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!(?err, "serialization error");
        Self::internal("An internal error occurred")
    }
}
