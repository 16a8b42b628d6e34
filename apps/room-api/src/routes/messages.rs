//! Chat history reads. Sending goes through the gateway.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::chat_message::ChatMessage;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms/{room_id}/messages", get(recent_messages))
        .route("/rooms/{room_id}/messages/history", get(message_history))
}

/// The newest 50 messages, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Recent messages", body = [ChatMessage]),
        (status = 403, description = "Not a member of the room", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn recent_messages(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    Ok(Json(state.chat.history(&user_id, &room_id).await?))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Return messages strictly older than this id.
    pub before: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/messages/history",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = String, Path, description = "Room ID"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "Up to 50 older messages, oldest first", body = [ChatMessage]),
        (status = 400, description = "Invalid cursor", body = ApiErrorBody),
        (status = 403, description = "Not a member of the room", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn message_history(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    // Ids travel as strings; see `ChatMessage::id`.
    let before = query
        .before
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("before must be a message id"))?;
    Ok(Json(state.chat.older_history(&user_id, &room_id, before).await?))
}
