//! Pushes today's average sleep SpO2 to the analytics wellness record.

use chrono::NaiveDate;
use tracing::{info, warn};
use wellness_ingestor::{
    analytics::WellnessService,
    call::{ApiOutcome, safe_call},
    models::wellness::WellnessRecord,
    providers::TrackerApi,
};

/// Today's `avgSleepSpO2`, or zero when the summary is missing or could not be fetched.
pub async fn today_avg_sleep_spo2<C>(client: &C, today: NaiveDate) -> f64
where
    C: TrackerApi + ?Sized,
{
    match safe_call(client.fetch_spo2_summary(today)).await {
        ApiOutcome::Success(Some(summary)) => match summary.avg_sleep_spo2 {
            Some(value) => value,
            None => {
                info!(%today, "summary has no average sleep SpO2, using 0");
                0.0
            }
        },
        ApiOutcome::Success(None) => {
            info!(%today, "no SpO2 summary available for today, using 0");
            0.0
        }
        ApiOutcome::Failure(failure) => {
            warn!(category = %failure.category, "could not fetch daily SpO2: {}", failure.message);
            0.0
        }
    }
}

/// Sets today's SpO2 on the analytics wellness record.
///
/// The record is read first so its other fields are written back unchanged; if the
/// read fails an empty record for `today` is sent instead. Returns the published
/// value, or `None` when the update was rejected.
pub async fn publish_today_summary<C, W>(client: &C, analytics: &W, today: NaiveDate) -> Option<f64>
where
    C: TrackerApi + ?Sized,
    W: WellnessService + ?Sized,
{
    let spo2 = today_avg_sleep_spo2(client, today).await;
    info!(%today, spo2, "latest average sleep SpO2");

    let mut record = match safe_call(analytics.wellness(today)).await {
        ApiOutcome::Success(record) => record,
        ApiOutcome::Failure(failure) => {
            warn!(
                category = %failure.category,
                "could not read wellness record, sending a new one: {}",
                failure.message
            );
            WellnessRecord::for_date(today)
        }
    };
    record.spo2 = Some(spo2);

    info!(spo2, "sending SpO2 to the wellness record");
    match safe_call(analytics.put_wellness(&record)).await {
        ApiOutcome::Success(_) => Some(spo2),
        ApiOutcome::Failure(failure) => {
            warn!(category = %failure.category, "wellness update failed: {}", failure.message);
            None
        }
    }
}
