use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::presence::PresenceStatus;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/presence/me", get(my_presence))
        .route("/presence/{user_id}", get(user_presence))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceResponse {
    pub user_id: String,
    pub status: PresenceStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/presence/me",
    tag = "Presence",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller's status", body = PresenceResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn my_presence(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let status = state.presence.get_status(&user_id).await?;
    Ok(Json(PresenceResponse { user_id, status }))
}

#[utoipa::path(
    get,
    path = "/api/v1/presence/{user_id}",
    tag = "Presence",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User's status, OFFLINE when unknown", body = PresenceResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn user_presence(
    AuthUser { .. }: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let status = state.presence.get_status(&user_id).await?;
    Ok(Json(PresenceResponse { user_id, status }))
}
