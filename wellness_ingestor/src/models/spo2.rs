//! SpO2 data as the tracker reports it, and the canonical reading stored locally.
//!
//! The tracker nests epoch-level samples inside a day's sleep data
//! (`wellnessEpochSPO2DataDTOList`). Each sample's `epochTimestamp` carries two
//! trailing characters beyond the precision we parse; they are stripped before
//! parsing (see [`parse_epoch_timestamp`]).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};

/// Daily SpO2 summary for one calendar day.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Spo2Summary {
    #[serde(rename = "calendarDate", default)]
    pub calendar_date: Option<NaiveDate>,
    #[serde(rename = "averageSpO2", default)]
    pub average_spo2: Option<f64>,
    #[serde(rename = "lowestSpO2", default)]
    pub lowest_spo2: Option<f64>,
    #[serde(rename = "latestSpO2", default)]
    pub latest_spo2: Option<f64>,
    /// Average SpO2 while asleep. This is the value pushed to the analytics service.
    #[serde(rename = "avgSleepSpO2", default)]
    pub avg_sleep_spo2: Option<f64>,
}

/// One epoch-level SpO2 sample from the sleep data.
///
/// Values are optional on the wire; a sample missing either one is rejected by
/// the conversion to [`Spo2Reading`] rather than failing the whole day.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EpochSpo2 {
    pub epoch_timestamp: String,
    #[serde(default)]
    pub spo2_reading: Option<i32>,
    #[serde(default)]
    pub reading_confidence: Option<i32>,
    #[serde(default)]
    pub device_id: Option<i64>,
}

/// The part of a day's sleep data this workspace cares about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SleepData {
    #[serde(rename = "wellnessEpochSPO2DataDTOList", default)]
    pub epoch_spo2: Option<Vec<EpochSpo2>>,
}

impl SleepData {
    /// Epoch samples, empty when the tracker sent none (or `null`).
    pub fn epoch_readings(&self) -> &[EpochSpo2] {
        self.epoch_spo2.as_deref().unwrap_or(&[])
    }
}

/// A single SpO2 reading, keyed by the full `(timestamp, spo2, confidence)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Spo2Reading {
    /// Instant of the sample, whole seconds.
    pub timestamp: DateTime<Utc>,
    /// Saturation percentage.
    pub spo2: i32,
    /// Tracker-provided quality indicator.
    pub confidence: i32,
}

impl TryFrom<&EpochSpo2> for Spo2Reading {
    type Error = ReadingError;

    fn try_from(epoch: &EpochSpo2) -> Result<Self, Self::Error> {
        let raw = &epoch.epoch_timestamp;
        Ok(Self {
            timestamp: parse_epoch_timestamp(raw)?,
            spo2: epoch.spo2_reading.context(MissingValueSnafu {
                field: "spo2Reading",
                raw,
            })?,
            confidence: epoch.reading_confidence.context(MissingValueSnafu {
                field: "readingConfidence",
                raw,
            })?,
        })
    }
}

/// Why an epoch sample could not become a [`Spo2Reading`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReadingError {
    #[snafu(transparent)]
    Timestamp { source: TimestampError },

    #[snafu(display("sample at {raw:?} has no {field}"))]
    MissingValue { field: &'static str, raw: String },
}

/// Errors raised while turning an `epochTimestamp` into an instant.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TimestampError {
    #[snafu(display("epoch timestamp {raw:?} is too short to strip its trailing digits"))]
    TooShort { raw: String },

    #[snafu(display("epoch timestamp {raw:?} has unparseable milliseconds: {source}"))]
    Millis {
        raw: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("epoch timestamp {raw:?} is not a date-time: {source}"))]
    Iso {
        raw: String,
        source: chrono::ParseError,
    },

    #[snafu(display("epoch timestamp {raw:?} is out of range"))]
    OutOfRange { raw: String },
}

/// Parses an `epochTimestamp` into a whole-second UTC instant.
///
/// The last two characters are always dropped first. What remains is either
/// epoch milliseconds (all digits), or an ISO-8601 date-time without offset,
/// read as UTC. Sub-second precision is truncated in both cases.
///
/// ```
/// use wellness_ingestor::models::spo2::parse_epoch_timestamp;
///
/// let from_millis = parse_epoch_timestamp("170000000012300").unwrap();
/// assert_eq!(from_millis.timestamp(), 1_700_000_000);
///
/// let from_iso = parse_epoch_timestamp("2024-05-01T03:15:00.0").unwrap();
/// assert_eq!(from_iso.to_rfc3339(), "2024-05-01T03:15:00+00:00");
/// ```
pub fn parse_epoch_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let cut = raw
        .char_indices()
        .rev()
        .nth(1)
        .map(|(idx, _)| idx)
        .filter(|idx| *idx > 0)
        .context(TooShortSnafu { raw })?;
    let trimmed = &raw[..cut];

    let seconds = if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = trimmed.parse().context(MillisSnafu { raw })?;
        millis.div_euclid(1000)
    } else {
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .context(IsoSnafu { raw })?
            .and_utc()
            .timestamp()
    };

    DateTime::from_timestamp(seconds, 0).context(OutOfRangeSnafu { raw })
}
