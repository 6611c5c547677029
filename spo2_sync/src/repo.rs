//! SpO2 reading repository (SQLite).
//!
//! Rows are never updated or deleted; [`Spo2Repo::insert_if_absent`] is the only write.
//! Callers that batch writes open a transaction with [`begin`] and close it with
//! [`commit`] (or [`rollback`]); the connection may be held across awaits in between.

use diesel::{
    connection::{AnsiTransactionManager, TransactionManager},
    dsl::count_star,
    prelude::*,
};
use wellness_ingestor::models::spo2::Spo2Reading;

use crate::{models::Spo2Row, schema::spo2::dsl as s};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while interacting with the reading repository.
pub enum RepoError {
    #[error("database error: {0}")]
    /// A query or statement failed.
    Diesel(#[from] diesel::result::Error),
}

/// Result type used throughout the repository for fallible operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Portable surface, SQLite implementation below.
pub trait Spo2Repo {
    /// Stores `reading` unless an identical row exists. Returns whether a row was written.
    fn insert_if_absent(
        &self,
        conn: &mut SqliteConnection,
        reading: &Spo2Reading,
    ) -> RepoResult<bool>;

    /// Number of stored readings.
    fn count(&self, conn: &mut SqliteConnection) -> RepoResult<i64>;

    /// Readings with `start <= timestamp < end` (epoch seconds), oldest first.
    fn between(
        &self,
        conn: &mut SqliteConnection,
        start: f64,
        end: f64,
    ) -> RepoResult<Vec<Spo2Row>>;
}

/// Repository for SpO2 readings in a SQLite database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteRepo;

impl SqliteRepo {
    /// Creates the repository.
    pub fn new() -> Self {
        Self
    }
}

impl Spo2Repo for SqliteRepo {
    fn insert_if_absent(
        &self,
        conn: &mut SqliteConnection,
        reading: &Spo2Reading,
    ) -> RepoResult<bool> {
        let written = diesel::insert_or_ignore_into(s::spo2)
            .values(Spo2Row::from(reading))
            .execute(conn)?;
        Ok(written > 0)
    }

    fn count(&self, conn: &mut SqliteConnection) -> RepoResult<i64> {
        Ok(s::spo2.select(count_star()).first(conn)?)
    }

    fn between(
        &self,
        conn: &mut SqliteConnection,
        start: f64,
        end: f64,
    ) -> RepoResult<Vec<Spo2Row>> {
        Ok(s::spo2
            .filter(s::timestamp.ge(start).and(s::timestamp.lt(end)))
            .order((s::timestamp.asc(), s::spo2_reading.asc()))
            .select(Spo2Row::as_select())
            .load(conn)?)
    }
}

/// Opens a transaction that stays open until [`commit`] or [`rollback`].
pub fn begin(conn: &mut SqliteConnection) -> RepoResult<()> {
    Ok(AnsiTransactionManager::begin_transaction(conn)?)
}

/// Commits the transaction opened by [`begin`].
pub fn commit(conn: &mut SqliteConnection) -> RepoResult<()> {
    Ok(AnsiTransactionManager::commit_transaction(conn)?)
}

/// Discards the transaction opened by [`begin`].
pub fn rollback(conn: &mut SqliteConnection) -> RepoResult<()> {
    Ok(AnsiTransactionManager::rollback_transaction(conn)?)
}
