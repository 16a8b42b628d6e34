//! Migration runner for the room directory schema.
//!
//! Usage:
//!   cargo run -p room-api --bin room-migrate            # apply pending
//!   cargo run -p room-api --bin room-migrate -- --list  # show pending only
//!   cargo run -p room-api --bin room-migrate -- --test  # use `<db>_test`
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let list_only = args.iter().any(|arg| arg == "--list");

    let mut database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    if args.iter().any(|arg| arg == "--test") {
        database_url = test_database_url(&database_url);
    }

    let mut conn =
        PgConnection::establish(&database_url).expect("failed to connect to database");

    if list_only {
        let pending = conn
            .pending_migrations(MIGRATIONS)
            .expect("failed to read migration state");
        if pending.is_empty() {
            println!("Schema is up to date.");
        }
        for migration in &pending {
            println!("  Pending: {}", migration.name());
        }
        return;
    }

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .expect("failed to run migrations");
    for migration in &applied {
        println!("  Applied: {migration}");
    }
    println!("{} migration(s) applied.", applied.len());
}

/// `postgres://host/readalong?x=y` → `postgres://host/readalong_test?x=y`.
fn test_database_url(database_url: &str) -> String {
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

    let mut url = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}
