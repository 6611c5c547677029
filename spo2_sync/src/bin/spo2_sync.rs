use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wellness_ingestor::{analytics::WellnessService, providers::connect_rest::ConnectProvider};

use spo2_sync::{
    config::SyncConfig,
    orchestrator::{self, RunOutcome},
    session::StdinPrompt,
};

#[derive(Parser)]
#[command(version, about = "Sync SpO2 readings from the tracker into SQLite and the wellness log")]
struct Cli {
    /// TOML config file (default: spo2_sync.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Days to look back, overriding DAYS_TO_FETCH and the config file
    #[arg(long)]
    days: Option<u32>,

    /// SQLite database file, overriding SPO2_DB and the config file
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match try_main(cli) {
        Ok(outcome) => ExitCode::from(&outcome),
        Err(e) => {
            error!("unexpected error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_main(cli: Cli) -> Result<RunOutcome> {
    let mut config = SyncConfig::load(cli.config.as_deref())?;
    if let Some(days) = cli.days {
        config.days_to_fetch = days;
    }
    if let Some(db) = cli.db {
        config.database = db;
    }

    let today = config.today()?;
    info!(%today, days = config.days_to_fetch, "starting SpO2 sync");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let outcome = runtime.block_on(async {
        let mut tracker = ConnectProvider::new(config.endpoints.tracker())
            .context("building tracker client")?;
        let analytics = orchestrator::intervals_client(&config)?;
        let mut prompt = StdinPrompt::new();

        orchestrator::run(
            &mut tracker,
            analytics.as_ref().map(|a| a as &dyn WellnessService),
            &mut prompt,
            &config,
            today,
            ctrl_c(),
        )
        .await
    });

    // Blocking work still in flight after an interrupt is not waited for.
    runtime.shutdown_background();
    outcome
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
