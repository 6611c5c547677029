//! Day-by-day backfill of epoch-level SpO2 readings into SQLite.
//!
//! Each day of the [`DateRange`] is visited exactly once. A day whose fetch fails,
//! or that has no data, is logged and skipped; only storage errors stop the run.
//! Writes go through [`Spo2Repo::insert_if_absent`], so re-running over days that
//! were already ingested adds nothing.

use chrono::{Days, NaiveDate};
use diesel::SqliteConnection;
use tracing::{debug, info, warn};
use wellness_ingestor::{
    call::{ApiOutcome, safe_call},
    models::spo2::{SleepData, Spo2Reading},
    providers::TrackerApi,
};

use crate::{
    config::{BackfillSettings, CommitPolicy, DayOrder},
    repo::{self, RepoResult, Spo2Repo},
};

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// `today - days ..= today`, i.e. `days + 1` days.
    pub fn lookback(today: NaiveDate, days: u32) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// First day of the range.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, never zero.
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Every day of the range, once, in `order`.
    pub fn days(&self, order: DayOrder) -> Box<dyn Iterator<Item = NaiveDate>> {
        let ascending = self.start.iter_days().take(self.num_days());
        match order {
            DayOrder::OldestFirst => Box::new(ascending),
            DayOrder::NewestFirst => Box::new(ascending.collect::<Vec<_>>().into_iter().rev()),
        }
    }
}

/// Counters for one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Days a fetch was issued for.
    pub days_visited: usize,
    /// Days whose fetch failed.
    pub days_failed: usize,
    /// Days that returned no readings.
    pub days_empty: usize,
    /// Epoch readings received.
    pub records_fetched: usize,
    /// Readings skipped because their timestamp could not be parsed.
    pub records_malformed: usize,
    /// Rows actually written; duplicates are not counted.
    pub rows_inserted: usize,
}

/// Fetches every day of `range` and stores its epoch readings.
///
/// Rows are committed once at the end, or after every day with
/// [`CommitPolicy::PerDay`]. On a storage error the open transaction is rolled back
/// and the error returned.
pub async fn ingest<C, R>(
    client: &C,
    repo: &R,
    conn: &mut SqliteConnection,
    range: DateRange,
    settings: &BackfillSettings,
) -> RepoResult<BackfillReport>
where
    C: TrackerApi + ?Sized,
    R: Spo2Repo + ?Sized,
{
    repo::begin(conn)?;
    match ingest_days(client, repo, conn, range, settings).await {
        Ok(report) => {
            repo::commit(conn)?;
            info!(
                days = report.days_visited,
                failed = report.days_failed,
                empty = report.days_empty,
                fetched = report.records_fetched,
                inserted = report.rows_inserted,
                "backfill finished"
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback) = repo::rollback(conn) {
                warn!(error = %rollback, "rollback after storage error failed");
            }
            Err(e)
        }
    }
}

async fn ingest_days<C, R>(
    client: &C,
    repo: &R,
    conn: &mut SqliteConnection,
    range: DateRange,
    settings: &BackfillSettings,
) -> RepoResult<BackfillReport>
where
    C: TrackerApi + ?Sized,
    R: Spo2Repo + ?Sized,
{
    let mut report = BackfillReport::default();

    for day in range.days(settings.order) {
        info!(%day, "querying sleep data");
        report.days_visited += 1;

        let outcome = settings
            .retry
            .run(|| safe_call(client.fetch_sleep_data(day)))
            .await;

        match outcome {
            ApiOutcome::Success(Some(sleep)) if !sleep.epoch_readings().is_empty() => {
                store_day(repo, conn, day, &sleep, &mut report)?;
            }
            ApiOutcome::Success(_) => {
                info!(%day, "no SpO2 data available");
                report.days_empty += 1;
            }
            ApiOutcome::Failure(failure) => {
                warn!(
                    %day,
                    category = %failure.category,
                    "could not fetch sleep data: {}",
                    failure.message
                );
                report.days_failed += 1;
            }
        }

        if settings.commit == CommitPolicy::PerDay {
            repo::commit(conn)?;
            repo::begin(conn)?;
        }
    }

    Ok(report)
}

fn store_day<R>(
    repo: &R,
    conn: &mut SqliteConnection,
    day: NaiveDate,
    sleep: &SleepData,
    report: &mut BackfillReport,
) -> RepoResult<()>
where
    R: Spo2Repo + ?Sized,
{
    let epochs = sleep.epoch_readings();
    let mut inserted = 0;
    for epoch in epochs {
        let reading = match Spo2Reading::try_from(epoch) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(%day, error = %e, "skipping malformed reading");
                report.records_malformed += 1;
                continue;
            }
        };
        if repo.insert_if_absent(conn, &reading)? {
            inserted += 1;
        } else {
            debug!(timestamp = %reading.timestamp, "reading already stored");
        }
    }
    report.records_fetched += epochs.len();
    report.rows_inserted += inserted;
    info!(%day, records = epochs.len(), inserted, "got records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn lookback_covers_n_plus_one_days() {
        let range = DateRange::lookback(d(2024, 3, 1), 3);
        assert_eq!(range.start(), d(2024, 2, 27));
        assert_eq!(range.num_days(), 4);

        let days: Vec<_> = range.days(DayOrder::OldestFirst).collect();
        assert_eq!(days, vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
    }

    #[test]
    fn newest_first_reverses_the_walk() {
        let range = DateRange::lookback(d(2024, 1, 2), 2);
        let days: Vec<_> = range.days(DayOrder::NewestFirst).collect();
        assert_eq!(days, vec![d(2024, 1, 2), d(2024, 1, 1), d(2023, 12, 31)]);
    }

    #[test]
    fn zero_lookback_is_just_today() {
        let range = DateRange::lookback(d(2024, 6, 30), 0);
        assert_eq!(range.days(DayOrder::OldestFirst).collect::<Vec<_>>(), vec![d(2024, 6, 30)]);
    }
}
