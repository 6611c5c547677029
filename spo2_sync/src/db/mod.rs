//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] applies WAL and a 5000ms busy_timeout.
//! - Embedded Diesel migrations: [`migrate::run_sqlite`] and [`migrate::open_and_migrate`],
//!   which opens a tuned connection and brings the `spo2` table up to date.
//!
//! Example:
//! ```no_run
//! use spo2_sync::db::migrate;
//!
//! let db_path = std::env::temp_dir().join("spo2_example.db3");
//! let _conn = migrate::open_and_migrate(db_path.to_str().unwrap()).expect("migrations");
//! ```

pub mod connection;
pub mod migrate;
