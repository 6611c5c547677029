//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies the PRAGMAs the
//! sync run relies on: WAL journaling and a 5000ms busy_timeout.
//!
//! Example:
//! ```no_run
//! use spo2_sync::db::connection::connect_sqlite;
//!
//! let path = std::env::temp_dir().join("spo2_example.db3");
//! let _conn = connect_sqlite(path.to_str().unwrap()).expect("open sqlite");
//! ```

use anyhow::Context;
use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .with_context(|| format!("opening SQLite database {database_url}"))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}
