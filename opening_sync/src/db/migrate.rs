//! set up migrations

use anyhow::anyhow;
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::db::connection::strip_scheme;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by `run_sqlite` to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a SQLite database at the given URL.
///
/// This sets the SQLite journal mode to WAL and applies all embedded migrations, returning an error on failure.
pub fn run_sqlite(url: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(strip_scheme(url))?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;
    conn.run_pending_migrations(MIGRATIONS).map_err(|e| anyhow!(e))?;

    Ok(())
}

/// Runs pending migrations for the given database URL.
///
/// Only SQLite is supported; `postgres://` URLs are rejected with a clear error.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        anyhow::bail!("Unsupported DATABASE_URL (postgres is not supported): {database_url}");
    }
    run_sqlite(database_url)
}

/// Names of embedded migrations not yet applied to this connection's database.
pub fn pending_migrations(conn: &mut SqliteConnection) -> anyhow::Result<Vec<String>> {
    let pending = conn.pending_migrations(MIGRATIONS).map_err(|e| anyhow!(e))?;
    Ok(pending.iter().map(|m| m.name().to_string()).collect())
}
