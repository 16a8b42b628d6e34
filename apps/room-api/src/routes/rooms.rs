//! Room endpoints: queries, entry/exit, and host playback commands.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::participant::Participant;
use crate::models::room::Room;
use crate::services::{CreateRoomRequest, RoomDetail};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room).get(list_rooms))
        .route("/rooms/{room_id}", get(get_room))
        .route("/rooms/{room_id}/participants", get(list_participants))
        .route("/rooms/{room_id}/enter", post(enter_room))
        .route("/rooms/{room_id}/leave", post(leave_room))
        .route("/rooms/{room_id}/kick/{user_id}", post(kick_user))
        .route("/rooms/{room_id}/speed", patch(update_play_speed))
        .route("/rooms/{room_id}/progress", patch(update_progress))
        .route("/rooms/{room_id}/start", post(start_reading))
        .route("/rooms/{room_id}/pause", post(pause_reading))
        .route("/rooms/{room_id}/finish", post(finish_reading))
}

// ---------------------------------------------------------------------------
// POST /api/v1/rooms
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created with the caller as host", body = Room),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Library entry not found", body = ApiErrorBody),
        (status = 409, description = "Caller already hosts an open room", body = ApiErrorBody),
    ),
)]
pub async fn create_room(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let room = state.rooms.create_room(&user_id, body).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Rooms that have not finished", body = [Room]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_rooms(
    AuthUser { .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Room>>, ApiError> {
    Ok(Json(state.rooms.list_rooms().await?))
}

// ---------------------------------------------------------------------------
// GET /api/v1/rooms/{room_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room with its participants", body = RoomDetail),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn get_room(
    AuthUser { .. }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetail>, ApiError> {
    Ok(Json(state.rooms.get_room(&room_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/rooms/{room_id}/participants",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Participant rows, any connection status", body = [Participant]),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn list_participants(
    AuthUser { .. }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    Ok(Json(state.rooms.list_participants(&room_id).await?))
}

// ---------------------------------------------------------------------------
// Entry and exit
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/enter",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Caller is an active participant", body = Participant),
        (status = 403, description = "Caller was kicked", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
        (status = 409, description = "Room is full, playing or finished", body = ApiErrorBody),
    ),
)]
pub async fn enter_room(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Participant>, ApiError> {
    Ok(Json(state.rooms.enter_room(&room_id, &user_id).await?))
}

/// The host leaving finishes the room for everyone.
#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/leave",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 204, description = "Left the room"),
        (status = 404, description = "Room or participant not found", body = ApiErrorBody),
    ),
)]
pub async fn leave_room(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.rooms.leave_room(&room_id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/kick/{user_id}",
    tag = "Rooms",
    security(("bearer" = [])),
    params(
        ("room_id" = String, Path, description = "Room ID"),
        ("user_id" = String, Path, description = "User to remove"),
    ),
    responses(
        (status = 200, description = "Participant kicked permanently", body = Participant),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
        (status = 404, description = "Room or participant not found", body = ApiErrorBody),
    ),
)]
pub async fn kick_user(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path((room_id, target_id)): Path<(String, String)>,
) -> Result<Json<Participant>, ApiError> {
    Ok(Json(state.rooms.kick_user(&room_id, &user_id, &target_id).await?))
}

// ---------------------------------------------------------------------------
// Host playback commands
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePlaySpeedRequest {
    pub play_speed: f64,
}

#[utoipa::path(
    patch,
    path = "/api/v1/rooms/{room_id}/speed",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    request_body = UpdatePlaySpeedRequest,
    responses(
        (status = 200, description = "Speed updated", body = Room),
        (status = 400, description = "Speed outside [0.5, 2.0]", body = ApiErrorBody),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
    ),
)]
pub async fn update_play_speed(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<UpdatePlaySpeedRequest>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(
        state
            .rooms
            .update_play_speed(&room_id, &user_id, body.play_speed)
            .await?,
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProgressRequest {
    pub chapter_id: Option<String>,
    pub position: i64,
}

#[utoipa::path(
    patch,
    path = "/api/v1/rooms/{room_id}/progress",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    request_body = UpdateProgressRequest,
    responses(
        (status = 200, description = "Progress stored", body = Room),
        (status = 400, description = "Negative position", body = ApiErrorBody),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
    ),
)]
pub async fn update_progress(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<UpdateProgressRequest>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(
        state
            .rooms
            .update_progress(&room_id, &user_id, body.chapter_id.as_deref(), body.position)
            .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/start",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room is playing", body = Room),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
        (status = 409, description = "Illegal transition", body = ApiErrorBody),
    ),
)]
pub async fn start_reading(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.rooms.start_reading(&room_id, &user_id).await?))
}

/// Toggles between PLAYING and PAUSED.
#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/pause",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room paused or resumed", body = Room),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
        (status = 409, description = "Illegal transition", body = ApiErrorBody),
    ),
)]
pub async fn pause_reading(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.rooms.pause_reading(&room_id, &user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/finish",
    tag = "Rooms",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    responses(
        (status = 200, description = "Room finished", body = Room),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
        (status = 409, description = "Room already finished", body = ApiErrorBody),
    ),
)]
pub async fn finish_reading(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.rooms.finish_reading(&room_id, &user_id).await?))
}
