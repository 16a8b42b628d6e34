//! Invitation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::invitation::Invitation;
use crate::models::participant::Participant;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms/{room_id}/invitations", post(invite_user))
        .route("/invitations/received", get(list_received))
        .route("/invitations/sent", get(list_sent))
        .route("/invitations/{invitation_id}/accept", post(accept_invitation))
        .route("/invitations/{invitation_id}/reject", post(reject_invitation))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteRequest {
    pub user_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/rooms/{room_id}/invitations",
    tag = "Invitations",
    security(("bearer" = [])),
    params(("room_id" = String, Path, description = "Room ID")),
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Invitation sent", body = Invitation),
        (status = 403, description = "Caller is not the host", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
        (status = 409, description = "Already invited, room playing or full", body = ApiErrorBody),
    ),
)]
pub async fn invite_user(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(body): Json<InviteRequest>,
) -> Result<(StatusCode, Json<Invitation>), ApiError> {
    let invitation = state
        .invitations
        .invite(&room_id, &user_id, &body.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// Invitations addressed to the caller, newest first. Stale PENDING rows are
/// listed as-is.
#[utoipa::path(
    get,
    path = "/api/v1/invitations/received",
    tag = "Invitations",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Received invitations", body = [Invitation]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_received(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invitation>>, ApiError> {
    Ok(Json(state.invitations.list_received(&user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/invitations/sent",
    tag = "Invitations",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Sent invitations", body = [Invitation]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_sent(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invitation>>, ApiError> {
    Ok(Json(state.invitations.list_sent(&user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/invitations/{invitation_id}/accept",
    tag = "Invitations",
    security(("bearer" = [])),
    params(("invitation_id" = String, Path, description = "Invitation ID")),
    responses(
        (status = 200, description = "Accepted and entered the room", body = Participant),
        (status = 403, description = "Not your invitation, or kicked", body = ApiErrorBody),
        (status = 404, description = "Invitation not found", body = ApiErrorBody),
        (status = 409, description = "Room full or playing", body = ApiErrorBody),
        (status = 410, description = "Invitation expired or already answered", body = ApiErrorBody),
    ),
)]
pub async fn accept_invitation(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<Json<Participant>, ApiError> {
    Ok(Json(state.invitations.accept(&invitation_id, &user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/invitations/{invitation_id}/reject",
    tag = "Invitations",
    security(("bearer" = [])),
    params(("invitation_id" = String, Path, description = "Invitation ID")),
    responses(
        (status = 200, description = "Invitation rejected", body = Invitation),
        (status = 403, description = "Not your invitation", body = ApiErrorBody),
        (status = 404, description = "Invitation not found", body = ApiErrorBody),
        (status = 410, description = "Invitation expired or already answered", body = ApiErrorBody),
    ),
)]
pub async fn reject_invitation(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<Json<Invitation>, ApiError> {
    Ok(Json(state.invitations.reject(&invitation_id, &user_id).await?))
}
