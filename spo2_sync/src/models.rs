//! Diesel models mapping to the database schema.
//!
//! [`Spo2Row`] mirrors [`crate::schema::spo2`]: one epoch-level reading, stored as
//! seconds since the Unix epoch plus the reading and its confidence. The whole row
//! is the key (see the embedded migrations).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use wellness_ingestor::models::spo2::Spo2Reading;

use crate::schema::spo2;

/// A row in [`crate::schema::spo2`].
///
/// Used for both SELECT and INSERT (Queryable, Selectable, Insertable).
#[derive(Debug, Clone, Copy, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = spo2, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Spo2Row {
    /// Seconds since the Unix epoch, always a whole number.
    pub timestamp: f64,
    /// Saturation percentage.
    pub spo2_reading: i32,
    /// Tracker-provided quality indicator.
    pub reading_confidence: i32,
}

impl Spo2Row {
    /// The stored instant as a UTC date-time, if it is representable.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp as i64, 0)
    }
}

impl From<&Spo2Reading> for Spo2Row {
    fn from(reading: &Spo2Reading) -> Self {
        Self {
            timestamp: reading.timestamp.timestamp() as f64,
            spo2_reading: reading.spo2,
            reading_confidence: reading.confidence,
        }
    }
}
