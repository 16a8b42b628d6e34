//! Postgres-backed environment for the `PgDirectory` tests.
//!
//! Only runs when DATABASE_URL is set (directly or through .env). Tests use
//! the `<db>_test` database and clean up the rows they seed.

use std::path::Path;
use std::sync::{Arc, Once};

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use parking_lot::Mutex;

use room_api::broker::MemoryBroker;
use room_api::config::Config;
use room_api::db::kv::MemoryStore;
use room_api::db::pool::{self, DbPool};
use room_api::db::schema::{books, libraries, reward_outbox, rooms, users};
use room_api::directory::postgres::PgDirectory;
use room_api::directory::Directory;
use room_api::external::MemoryBlobStore;
use room_api::{AppState, Backends};

use super::TEST_JWT_SECRET;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

static MIGRATE: Once = Once::new();

pub struct PgEnv {
    pub state: AppState,
    pub directory: Arc<PgDirectory>,
    pub pool: DbPool,
    seeded_users: Mutex<Vec<String>>,
}

impl PgEnv {
    /// `None` when no database is configured.
    pub fn connect() -> Option<Self> {
        if dotenvy::dotenv().is_err() {
            let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
            let _ = dotenvy::from_path(env_path);
        }
        let database_url = with_test_db_suffix(&std::env::var("DATABASE_URL").ok()?);

        MIGRATE.call_once(|| {
            let mut conn =
                PgConnection::establish(&database_url).expect("connect to test database");
            conn.run_pending_migrations(MIGRATIONS)
                .expect("run migrations on test database");
        });

        let pool = pool::connect(&database_url).expect("build test pool");
        let directory = Arc::new(PgDirectory::new(pool.clone()));
        let state = AppState::new(
            Config::local(TEST_JWT_SECRET),
            Backends {
                directory: Directory::from_store(directory.clone()),
                kv: Arc::new(MemoryStore::new()),
                broker: Arc::new(MemoryBroker::new()),
                accounts: directory.clone(),
                catalog: directory.clone(),
                blobs: Arc::new(MemoryBlobStore::new()),
            },
        )
        .expect("build app state");

        Some(Self {
            state,
            directory,
            pool,
            seeded_users: Mutex::new(Vec::new()),
        })
    }

    /// Insert a user with one library book. Returns the library id.
    pub async fn seed_user(&self, user_id: &str) -> String {
        let mut conn = self.pool.get().await.expect("db connection");
        let book_id = format!("book_{user_id}");
        let library_id = format!("lib_{user_id}");

        diesel::insert_into(users::table)
            .values((users::id.eq(user_id), users::nickname.eq(format!("{user_id}_nick"))))
            .execute(&mut conn)
            .await
            .expect("insert user");
        diesel::insert_into(books::table)
            .values((
                books::id.eq(&book_id),
                books::title.eq("Demian"),
                books::author.eq("Hermann Hesse"),
            ))
            .execute(&mut conn)
            .await
            .expect("insert book");
        diesel::insert_into(libraries::table)
            .values((
                libraries::id.eq(&library_id),
                libraries::user_id.eq(user_id),
                libraries::book_id.eq(&book_id),
            ))
            .execute(&mut conn)
            .await
            .expect("insert library");

        self.seeded_users.lock().push(user_id.to_string());
        library_id
    }

    /// `(event_type, payload)` of every outbox row for the room.
    pub async fn outbox_rows(&self, room_id: &str) -> Vec<(String, serde_json::Value)> {
        let mut conn = self.pool.get().await.expect("db connection");
        reward_outbox::table
            .filter(reward_outbox::room_id.eq(room_id))
            .select((reward_outbox::event_type, reward_outbox::payload))
            .load(&mut conn)
            .await
            .expect("load outbox rows")
    }

    /// Delete everything the seeded users own. Rooms cascade to their
    /// participants, invitations, chat and outbox rows.
    pub async fn cleanup(&self) {
        let user_ids = std::mem::take(&mut *self.seeded_users.lock());
        let book_ids: Vec<String> = user_ids.iter().map(|id| format!("book_{id}")).collect();
        let mut conn = self.pool.get().await.expect("db connection");

        diesel::delete(rooms::table.filter(rooms::host_id.eq_any(user_ids.clone())))
            .execute(&mut conn)
            .await
            .ok();
        diesel::delete(libraries::table.filter(libraries::user_id.eq_any(user_ids.clone())))
            .execute(&mut conn)
            .await
            .ok();
        diesel::delete(users::table.filter(users::id.eq_any(user_ids)))
            .execute(&mut conn)
            .await
            .ok();
        diesel::delete(books::table.filter(books::id.eq_any(book_ids)))
            .execute(&mut conn)
            .await
            .ok();
    }
}

/// `postgres://host/readalong` → `postgres://host/readalong_test`.
fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}
