//! SQLite connection helpers.
//!
//! Every invocation of the sync state machine opens its own connection, so the
//! PRAGMAs below are applied on each open rather than once per process.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Open a SQLite connection and apply connection-wide PRAGMAs.
///
/// Accepts bare file paths as well as `sqlite://` / `sqlite:` prefixed URLs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(strip_scheme(database_url))?;

    // Readers (status polls) don't block the writer.
    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

pub(crate) fn strip_scheme(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}
