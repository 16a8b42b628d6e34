#![allow(dead_code)]

pub mod postgres;

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use http::header::AUTHORIZATION;

use room_api::auth::tokens;
use room_api::broker::MemoryBroker;
use room_api::config::Config;
use room_api::db::kv::MemoryStore;
use room_api::directory::memory::MemoryDirectory;
use room_api::directory::Directory;
use room_api::external::{MemoryAccounts, MemoryBlobStore, MemoryCatalog};
use room_api::{AppState, Backends};

pub const TEST_JWT_SECRET: &str = "test-secret-do-not-use-in-production";

/// Application state on in-memory stores, plus handles for seeding the
/// external collaborators.
pub struct TestEnv {
    pub state: AppState,
    pub directory: Arc<MemoryDirectory>,
    pub broker: Arc<MemoryBroker>,
    pub accounts: Arc<MemoryAccounts>,
    pub catalog: Arc<MemoryCatalog>,
}

impl TestEnv {
    pub fn new() -> Self {
        let directory = Arc::new(MemoryDirectory::new());
        let broker = Arc::new(MemoryBroker::new());
        let accounts = Arc::new(MemoryAccounts::new());
        let catalog = Arc::new(MemoryCatalog::new());

        let state = AppState::new(
            Config::local(TEST_JWT_SECRET),
            Backends {
                directory: Directory::from_store(directory.clone()),
                kv: Arc::new(MemoryStore::new()),
                broker: broker.clone(),
                accounts: accounts.clone(),
                catalog: catalog.clone(),
                blobs: Arc::new(MemoryBlobStore::new()),
            },
        )
        .expect("build app state");

        Self {
            state,
            directory,
            broker,
            accounts,
            catalog,
        }
    }

    pub fn app(&self) -> Router {
        room_api::routes::router().with_state(self.state.clone())
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.app()).unwrap()
    }

    /// Register a user and give them one library book to host rooms with.
    /// Returns the library id.
    pub fn seed_user(&self, user_id: &str) -> String {
        self.accounts.add_user(user_id, &format!("{user_id}_nick"));
        let library_id = format!("lib_{user_id}");
        self.catalog
            .add_library_book(&library_id, user_id, "book_demian", "Demian", "Hermann Hesse");
        library_id
    }
}

/// Mint an access token for a user.
pub fn token_for(user_id: &str) -> String {
    tokens::issue_access_token(user_id, TEST_JWT_SECRET).expect("mint test token")
}

pub fn bearer(user_id: &str) -> (http::HeaderName, String) {
    (AUTHORIZATION, format!("Bearer {}", token_for(user_id)))
}

pub fn new_user_id() -> String {
    readalong_common::id::prefixed_ulid(readalong_common::id::prefix::USER)
}

/// Create a room hosted by `host_id` through the API and return its id.
pub async fn create_room(server: &TestServer, env: &TestEnv, host_id: &str, max_capacity: i32) -> String {
    let library_id = env.seed_user(host_id);
    let (name, value) = bearer(host_id);
    let resp = server
        .post("/api/v1/rooms")
        .add_header(name, value)
        .json(&serde_json::json!({
            "library_id": library_id,
            "max_capacity": max_capacity,
        }))
        .await;
    resp.assert_status(http::StatusCode::CREATED);
    resp.json::<serde_json::Value>()["id"]
        .as_str()
        .unwrap()
        .to_string()
}
