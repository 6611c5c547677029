mod common;
use common::{
    DayReply, MockTracker, MockWellness, ScriptedPrompt, Stalled, StoredSession, day, http,
    sleep_with,
};

use std::{future::pending, io::BufReader, time::Duration};

use chrono::NaiveDate;
use serial_test::serial;
use spo2_sync::{
    config::SyncConfig,
    db::connection::connect_sqlite,
    orchestrator::{RunStatus, run},
    repo::{Spo2Repo, SqliteRepo},
    session::StdinPrompt,
};
use wellness_ingestor::{
    analytics::WellnessService,
    models::spo2::Spo2Summary,
    providers::{LoginOutcome, MfaChallenge},
};

fn today() -> NaiveDate {
    day(2024, 5, 10)
}

fn clear_login_env() {
    // SAFETY: every test in this file is serialized.
    unsafe {
        std::env::remove_var("EMAIL");
        std::env::remove_var("PASSWORD");
    }
}

fn config_in(dir: &std::path::Path, days: u32) -> SyncConfig {
    let mut config = SyncConfig {
        days_to_fetch: days,
        database: dir.join("spo2.db3"),
        ..SyncConfig::default()
    };
    config.session.token_store = dir.join("tokens");
    config
}

#[tokio::test]
#[serial]
async fn three_day_window_stores_four_rows_and_exits_zero() {
    clear_login_env();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let mut tracker = MockTracker::new(StoredSession::Valid)
        .with_summary(Ok(Some(Spo2Summary {
            avg_sleep_spo2: Some(95.0),
            ..Spo2Summary::default()
        })))
        .with_day(
            day(2024, 5, 8),
            DayReply::Data(sleep_with(&[
                ("2024-05-08T01:00:00.0", 95, 2),
                ("2024-05-08T01:01:00.0", 94, 2),
            ])),
        )
        .with_day(day(2024, 5, 9), DayReply::Status(404))
        .with_day(
            day(2024, 5, 10),
            DayReply::Data(sleep_with(&[
                ("2024-05-10T01:00:00.0", 96, 3),
                ("2024-05-10T01:01:00.0", 97, 3),
            ])),
        );
    let analytics = MockWellness::new(None);
    let mut prompt = ScriptedPrompt::silent();

    let outcome = run(
        &mut tracker,
        Some(&analytics as &dyn WellnessService),
        &mut prompt,
        &config,
        today(),
        pending(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.published, Some(95.0));
    assert_eq!(tracker.fetched_days().len(), 3);

    let mut conn = connect_sqlite(config.database.to_str().unwrap()).unwrap();
    assert_eq!(SqliteRepo::new().count(&mut conn).unwrap(), 4);
}

#[tokio::test]
#[serial]
async fn no_session_exits_zero_without_touching_the_database() {
    clear_login_env();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let mut tracker =
        MockTracker::new(StoredSession::Missing).with_logins(vec![Err(common::offline())]);
    let mut prompt = ScriptedPrompt::new(&[Some("a@b.c"), Some("pw")]);

    let outcome = run(&mut tracker, None, &mut prompt, &config, today(), pending())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::NoSession);
    assert_eq!(outcome.exit_code(), 0);
    assert!(tracker.fetched_days().is_empty());
    assert!(!config.database.exists());
}

#[tokio::test]
#[serial]
async fn fatal_mfa_exits_one() {
    clear_login_env();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let mut tracker = MockTracker::new(StoredSession::Missing)
        .with_logins(vec![Ok(LoginOutcome::NeedsMfa(MfaChallenge {
            ticket: "t".into(),
        }))])
        .with_mfa(vec![Err(http(429))]);
    let mut prompt = ScriptedPrompt::new(&[Some("a@b.c"), Some("pw"), Some("123456")]);

    let outcome = run(&mut tracker, None, &mut prompt, &config, today(), pending())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::MfaFailed);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
#[serial]
async fn cancelled_login_exits_zero() {
    clear_login_env();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let mut tracker = MockTracker::new(StoredSession::Missing);
    let mut prompt = ScriptedPrompt::new(&[None]);

    let outcome = run(&mut tracker, None, &mut prompt, &config, today(), pending())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(tracker.login_count(), 0);
}

#[tokio::test]
#[serial]
async fn interrupt_at_a_blocked_prompt_exits_zero() {
    clear_login_env();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let mut tracker = MockTracker::new(StoredSession::Missing);
    let (_hold, stalled) = Stalled::new();
    let mut prompt = StdinPrompt::from_reader(BufReader::new(stalled));

    let outcome = run(
        &mut tracker,
        None,
        &mut prompt,
        &config,
        today(),
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(tracker.login_count(), 0);
    assert!(!config.database.exists());
}

#[tokio::test]
#[serial]
async fn interrupt_during_backfill_is_an_error() {
    clear_login_env();
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), 2);
    let mut tracker = MockTracker::new(StoredSession::Valid)
        .with_day(
            day(2024, 5, 8),
            DayReply::Data(sleep_with(&[("2024-05-08T01:00:00.0", 95, 2)])),
        )
        .with_day(day(2024, 5, 9), DayReply::Hang);
    let mut prompt = ScriptedPrompt::silent();

    let result = run(
        &mut tracker,
        None,
        &mut prompt,
        &config,
        today(),
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(tracker.fetched_days(), vec![day(2024, 5, 8), day(2024, 5, 9)]);

    // The open transaction died with the connection.
    let mut conn = connect_sqlite(config.database.to_str().unwrap()).unwrap();
    assert_eq!(SqliteRepo::new().count(&mut conn).unwrap(), 0);
}
