pub mod health;
pub mod invitations;
pub mod messages;
pub mod presence;
pub mod rooms;
pub mod sessions;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            rooms::router()
                .merge(invitations::router())
                .merge(messages::router())
                .merge(presence::router())
                .merge(sessions::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Rooms
        rooms::create_room,
        rooms::list_rooms,
        rooms::get_room,
        rooms::list_participants,
        rooms::enter_room,
        rooms::leave_room,
        rooms::kick_user,
        rooms::update_play_speed,
        rooms::update_progress,
        rooms::start_reading,
        rooms::pause_reading,
        rooms::finish_reading,
        // Invitations
        invitations::invite_user,
        invitations::list_received,
        invitations::list_sent,
        invitations::accept_invitation,
        invitations::reject_invitation,
        // Messages
        messages::recent_messages,
        messages::message_history,
        // Presence
        presence::my_presence,
        presence::user_presence,
        // Sessions
        sessions::disconnect_all,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            // Models
            crate::models::room::Room,
            crate::models::room::RoomStatus,
            crate::models::participant::Participant,
            crate::models::participant::ConnectionStatus,
            crate::models::invitation::Invitation,
            crate::models::invitation::InvitationStatus,
            crate::models::chat_message::ChatMessage,
            crate::models::chat_message::ChatMessageType,
            crate::presence::PresenceStatus,
            crate::presence::PresenceUpdate,
            // Route request/response types
            health::HealthResponse,
            crate::services::CreateRoomRequest,
            crate::services::RoomDetail,
            rooms::UpdatePlaySpeedRequest,
            rooms::UpdateProgressRequest,
            invitations::InviteRequest,
            presence::PresenceResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Rooms", description = "Reading rooms"),
        (name = "Invitations", description = "Room invitations"),
        (name = "Messages", description = "Room chat history"),
        (name = "Presence", description = "User presence"),
        (name = "Sessions", description = "Gateway session control"),
    )
)]
pub struct ApiDoc;
