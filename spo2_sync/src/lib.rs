//! SpO2 sync: pulls blood-oxygen readings from a fitness tracker into SQLite and
//! pushes today's average sleep SpO2 to a training-analytics wellness record.
//!
//! A run is driven by [`orchestrator::run`]:
//! 1. [`session::acquire_session`] reuses the stored session or logs in.
//! 2. [`publish::publish_today_summary`] sends today's value.
//! 3. [`backfill::ingest`] stores every epoch reading of the lookback window.

#![deny(missing_docs)]

pub mod backfill;
pub mod config;
pub mod db;
pub mod models;
pub mod orchestrator;
pub mod publish;
pub mod repo;
pub mod retry;
#[allow(missing_docs)]
pub mod schema;
pub mod session;
