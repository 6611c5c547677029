//! Abstraction over the training-analytics service that receives the daily SpO2 value.

pub mod intervals_rest;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{models::wellness::WellnessRecord, providers::ProviderError};

/// Read/write access to the per-date wellness record of one athlete.
#[async_trait]
pub trait WellnessService: Send + Sync {
    /// Fetches the wellness record for `date`.
    async fn wellness(&self, date: NaiveDate) -> Result<WellnessRecord, ProviderError>;

    /// Writes `record` back, returning the record as the service stored it.
    async fn put_wellness(&self, record: &WellnessRecord) -> Result<WellnessRecord, ProviderError>;
}
