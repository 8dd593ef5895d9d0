//! Apply the embedded SQL migrations.
//!
//! Usage:
//!   cargo run -p netcafe-api --bin netcafe-migrate
//!   cargo run -p netcafe-api --bin netcafe-migrate -- --test
//!
//! `--test` targets the `<db>_test` database used by the integration tests.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use netcafe_api::config;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() {
    config::load_dotenv();

    let mut database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    if std::env::args().any(|arg| arg == "--test") {
        database_url = config::with_test_db_suffix(&database_url);
    }

    println!("Connecting to database...");
    let mut conn =
        PgConnection::establish(&database_url).expect("failed to connect to database");

    let applied = match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => applied,
        Err(err) => {
            eprintln!("Migration failed: {err}");
            std::process::exit(1);
        }
    };

    if applied.is_empty() {
        println!("Schema is up to date.");
        return;
    }
    for migration in &applied {
        println!("  applied {migration}");
    }
    println!("{} migration(s) applied.", applied.len());
}
