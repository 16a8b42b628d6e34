use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_api::broker::{Broker, MemoryBroker, RedisBroker};
use room_api::config::Config;
use room_api::db::kv::{KeyValueStore, MemoryStore, RedisStore};
use room_api::directory::memory::MemoryDirectory;
use room_api::directory::postgres::PgDirectory;
use room_api::directory::Directory;
use room_api::external::{
    BlobStore, HttpBlobStore, LibraryCatalog, MemoryAccounts, MemoryBlobStore, MemoryCatalog,
    UserDirectory,
};
use room_api::{AppState, Backends};

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Rooms, participants, invitations and chat logs.
    let (directory, accounts, catalog): (Directory, Arc<dyn UserDirectory>, Arc<dyn LibraryCatalog>) =
        match &config.database_url {
            Some(url) => {
                let pool = room_api::db::pool::connect(url).expect("failed to create database pool");
                let pg = Arc::new(PgDirectory::new(pool));
                (Directory::from_store(pg.clone()), pg.clone(), pg)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory directory");
                (
                    Directory::from_store(Arc::new(MemoryDirectory::new())),
                    Arc::new(MemoryAccounts::new()),
                    Arc::new(MemoryCatalog::new()),
                )
            }
        };

    // Presence and cross-instance fan-out.
    let (kv, broker): (Arc<dyn KeyValueStore>, Arc<dyn Broker>) = match &config.redis_url {
        Some(url) => {
            let kv = RedisStore::connect(url).await.expect("failed to connect to redis");
            let broker = RedisBroker::connect(url)
                .await
                .expect("failed to connect redis broker");
            (Arc::new(kv), Arc::new(broker))
        }
        None => {
            tracing::warn!("REDIS_URL not set, presence and fan-out are local to this instance");
            (Arc::new(MemoryStore::new()), Arc::new(MemoryBroker::new()))
        }
    };

    let blobs: Arc<dyn BlobStore> = match &config.blob_base_url {
        Some(url) => Arc::new(HttpBlobStore::new(url)),
        None => Arc::new(MemoryBlobStore::new()),
    };

    tracing::info!(
        instance_id = config.instance_id,
        app_env = ?config.app_env,
        "room-api configured"
    );

    let state = AppState::new(
        config,
        Backends {
            directory,
            kv,
            broker,
            accounts,
            catalog,
            blobs,
        },
    )
    .expect("invalid INSTANCE_ID");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(room_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "room-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
