//! One sync run: session, then today's summary, then the backfill.

use std::{pin::pin, process::ExitCode};

use anyhow::{Context, bail};
use chrono::NaiveDate;
use tracing::{error, info, warn};
use wellness_ingestor::{
    analytics::{WellnessService, intervals_rest::IntervalsProvider},
    providers::TrackerApi,
};

use crate::{
    backfill::{self, BackfillReport, DateRange},
    config::SyncConfig,
    db::migrate::open_and_migrate,
    publish::publish_today_summary,
    repo::SqliteRepo,
    session::{Prompt, SessionOutcome, SessionRequest, acquire_session},
};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Publication was attempted and the backfill finished.
    Completed,
    /// The user cancelled during login.
    Cancelled,
    /// No session could be established; nothing was fetched.
    NoSession,
    /// MFA failed in a way that cannot be retried.
    MfaFailed,
}

/// Result of [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// How the run ended.
    pub status: RunStatus,
    /// Value written to the wellness record, if any.
    pub published: Option<f64>,
    /// Backfill counters, when the backfill ran.
    pub backfill: Option<BackfillReport>,
}

impl RunOutcome {
    fn stopped(status: RunStatus) -> Self {
        Self {
            status,
            published: None,
            backfill: None,
        }
    }

    /// Process exit code: 1 for fatal MFA failures, 0 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::MfaFailed => 1,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::NoSession => 0,
        }
    }
}

impl From<&RunOutcome> for ExitCode {
    fn from(outcome: &RunOutcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}

/// Builds the analytics client from the configured athlete id and API key.
///
/// Missing credentials are not an error: the run skips publication.
pub fn intervals_client(config: &SyncConfig) -> anyhow::Result<Option<IntervalsProvider>> {
    let credentials = match config.analytics_credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("{e}; today's SpO2 will not be published");
            return Ok(None);
        }
    };
    let client = IntervalsProvider::new(
        credentials.athlete_id,
        credentials.api_key,
        &config.endpoints.intervals,
    )
    .context("building analytics client")?;
    Ok(Some(client))
}

/// Establishes a session, publishes today's summary, then backfills the lookback window.
///
/// `today` is fixed by the caller and used for both the summary and the window.
/// Storage failures are returned as errors; remote failures are logged and skipped.
///
/// `interrupt` resolving during login ends the run as [`RunStatus::Cancelled`]; once
/// the session is up it aborts the run with an error, dropping uncommitted rows.
pub async fn run<C, I>(
    client: &mut C,
    analytics: Option<&dyn WellnessService>,
    prompt: &mut dyn Prompt,
    config: &SyncConfig,
    today: NaiveDate,
    interrupt: I,
) -> anyhow::Result<RunOutcome>
where
    C: TrackerApi + ?Sized,
    I: Future<Output = ()>,
{
    let mut interrupt = pin!(interrupt);

    let token_store = config.token_store();
    let credentials = match config.get_credentials() {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            info!("{e}; will prompt if a login is needed");
            None
        }
    };
    let request = SessionRequest {
        token_store: &token_store,
        mfa_max_attempts: config.session.mfa_max_attempts,
        credentials,
    };

    let session = tokio::select! {
        session = acquire_session(client, request, prompt) => session,
        () = &mut interrupt => {
            info!("interrupted during login, exiting");
            return Ok(RunOutcome::stopped(RunStatus::Cancelled));
        }
    };
    match session {
        Ok(SessionOutcome::Acquired { .. }) => {}
        Ok(SessionOutcome::Cancelled) => return Ok(RunOutcome::stopped(RunStatus::Cancelled)),
        Ok(SessionOutcome::Unavailable(failure)) => {
            error!("failed to initialize API, exiting: {failure}");
            return Ok(RunOutcome::stopped(RunStatus::NoSession));
        }
        Err(e) => {
            error!("{e}");
            return Ok(RunOutcome::stopped(RunStatus::MfaFailed));
        }
    }

    tokio::select! {
        outcome = sync(&*client, analytics, config, today) => outcome,
        () = &mut interrupt => bail!("interrupted"),
    }
}

async fn sync<C>(
    client: &C,
    analytics: Option<&dyn WellnessService>,
    config: &SyncConfig,
    today: NaiveDate,
) -> anyhow::Result<RunOutcome>
where
    C: TrackerApi + ?Sized,
{
    let published = match analytics {
        Some(analytics) => publish_today_summary(client, analytics, today).await,
        None => None,
    };

    let range = DateRange::lookback(today, config.days_to_fetch);
    info!(start = %range.start(), end = %range.end(), "starting backfill");

    let database = config.database.to_string_lossy();
    let mut conn = open_and_migrate(&database)?;
    let report = backfill::ingest(client, &SqliteRepo::new(), &mut conn, range, &config.backfill)
        .await
        .with_context(|| format!("storing readings in {database}"))?;

    Ok(RunOutcome {
        status: RunStatus::Completed,
        published,
        backfill: Some(report),
    })
}
