pub mod auth;
pub mod broker;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod external;
pub mod gateway;
pub mod guards;
pub mod models;
pub mod presence;
pub mod routes;
pub mod services;

use std::sync::Arc;

use broker::Broker;
use config::Config;
use db::kv::KeyValueStore;
use directory::Directory;
use external::{BlobStore, LibraryCatalog, UserDirectory};
use presence::PresenceStore;
use readalong_common::{SnowflakeError, SnowflakeGenerator};
use services::{ChatRelay, InvitationService, RoomService};

/// Storage and messaging backends chosen at startup.
pub struct Backends {
    pub directory: Directory,
    pub kv: Arc<dyn KeyValueStore>,
    pub broker: Arc<dyn Broker>,
    pub accounts: Arc<dyn UserDirectory>,
    pub catalog: Arc<dyn LibraryCatalog>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Directory,
    pub broker: Arc<dyn Broker>,
    pub presence: PresenceStore,
    pub rooms: RoomService,
    pub invitations: InvitationService,
    pub chat: ChatRelay,
}

impl AppState {
    /// Wire the services on top of the given backends.
    pub fn new(config: Config, backends: Backends) -> Result<Self, SnowflakeError> {
        let snowflake = Arc::new(SnowflakeGenerator::new(config.instance_id)?);

        let presence = PresenceStore::new(
            backends.kv,
            backends.broker.clone(),
            backends.accounts,
            backends.directory.participants.clone(),
        );
        let rooms = RoomService::new(
            backends.directory.clone(),
            backends.catalog,
            presence.clone(),
            backends.broker.clone(),
        );
        let invitations =
            InvitationService::new(backends.directory.clone(), rooms.clone(), backends.broker.clone());
        let chat = ChatRelay::new(
            backends.directory.clone(),
            backends.broker.clone(),
            backends.blobs,
            snowflake,
            config.app_env.allows_debug_chat(),
        );

        Ok(Self {
            config: Arc::new(config),
            directory: backends.directory,
            broker: backends.broker,
            presence,
            rooms,
            invitations,
            chat,
        })
    }
}
