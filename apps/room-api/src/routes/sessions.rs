use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use crate::auth::middleware::AuthUser;
use crate::broker::Topic;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/sessions/disconnect", post(disconnect_all))
}

/// Close every gateway socket of the caller on every instance.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/disconnect",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Kick signal published"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn disconnect_all(
    AuthUser { user_id }: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.broker.publish(&Topic::UserKick, &user_id).await?;
    tracing::info!(%user_id, "forced disconnect requested");
    Ok(StatusCode::NO_CONTENT)
}
