//! The analytics service's per-date wellness record.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A wellness record for one date.
///
/// Only `spO2` is modelled; every other field the service returns is kept in
/// `extra`, in its original order, and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellnessRecord {
    /// The record's date; the service uses it as the record id.
    pub id: NaiveDate,
    #[serde(rename = "spO2", default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl WellnessRecord {
    /// An empty record for `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            id: date,
            spo2: None,
            extra: IndexMap::new(),
        }
    }
}
