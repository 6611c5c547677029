//! Embedded schema migrations.

use anyhow::anyhow;
use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by [`run_sqlite`] to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on an open SQLite connection.
///
/// Returns the versions that were applied; empty when the schema was already current.
pub fn run_sqlite(conn: &mut SqliteConnection) -> anyhow::Result<Vec<String>> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    Ok(applied.into_iter().map(|v| v.to_string()).collect())
}

/// Opens the database at `database_url` with [`connect_sqlite`](super::connection::connect_sqlite)
/// and migrates it.
pub fn open_and_migrate(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let mut conn = super::connection::connect_sqlite(database_url)?;
    let applied = run_sqlite(&mut conn)?;
    if !applied.is_empty() {
        tracing::info!(database = database_url, ?applied, "applied migrations");
    }
    Ok(conn)
}
