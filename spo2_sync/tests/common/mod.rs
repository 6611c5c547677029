#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io::{self, Read},
    path::{Path, PathBuf},
    sync::{Mutex, mpsc},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use secrecy::SecretString;
use spo2_sync::{
    db::migrate,
    session::{Prompt, PromptError},
};
use tempfile::TempDir;
use wellness_ingestor::{
    analytics::WellnessService,
    models::{
        spo2::{EpochSpo2, SleepData, Spo2Summary},
        wellness::WellnessRecord,
    },
    providers::{
        AuthenticationSnafu, ConnectionSnafu, HttpSnafu, LoginOutcome, MfaChallenge,
        MissingTokensSnafu, ProviderError, TrackerApi,
    },
};

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/spo2.db3
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("spo2.db3").to_string_lossy().to_string();
    let conn = migrate::open_and_migrate(&path).expect("migrations");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Sleep data holding one epoch reading per `(timestamp, spo2, confidence)`.
pub fn sleep_with(readings: &[(&str, i32, i32)]) -> SleepData {
    SleepData {
        epoch_spo2: Some(
            readings
                .iter()
                .map(|(ts, spo2, confidence)| EpochSpo2 {
                    epoch_timestamp: ts.to_string(),
                    spo2_reading: Some(*spo2),
                    reading_confidence: Some(*confidence),
                    device_id: None,
                })
                .collect(),
        ),
    }
}

/// How the tracker reacts to loading the stored session.
#[derive(Clone, Copy, Debug)]
pub enum StoredSession {
    Valid,
    Missing,
    Rejected,
    Offline,
}

/// What the tracker returns for one day's sleep data.
#[derive(Clone, Debug)]
pub enum DayReply {
    Data(SleepData),
    Empty,
    Status(u16),
    /// Never answers.
    Hang,
}

/// Scripted tracker. Login and MFA replies are consumed in order.
pub struct MockTracker {
    pub stored: StoredSession,
    pub logins: Mutex<VecDeque<Result<LoginOutcome, ProviderError>>>,
    pub mfa: Mutex<VecDeque<Result<(), ProviderError>>>,
    pub days: HashMap<NaiveDate, DayReply>,
    pub summary: Result<Option<Spo2Summary>, u16>,
    pub login_emails: Mutex<Vec<String>>,
    pub mfa_codes: Mutex<Vec<String>>,
    pub fetched_days: Mutex<Vec<NaiveDate>>,
    pub dumped_to: Mutex<Vec<PathBuf>>,
}

impl MockTracker {
    pub fn new(stored: StoredSession) -> Self {
        Self {
            stored,
            logins: Mutex::new(VecDeque::new()),
            mfa: Mutex::new(VecDeque::new()),
            days: HashMap::new(),
            summary: Ok(None),
            login_emails: Mutex::new(Vec::new()),
            mfa_codes: Mutex::new(Vec::new()),
            fetched_days: Mutex::new(Vec::new()),
            dumped_to: Mutex::new(Vec::new()),
        }
    }

    pub fn with_logins(self, replies: Vec<Result<LoginOutcome, ProviderError>>) -> Self {
        *self.logins.lock().unwrap() = replies.into();
        self
    }

    pub fn with_mfa(self, replies: Vec<Result<(), ProviderError>>) -> Self {
        *self.mfa.lock().unwrap() = replies.into();
        self
    }

    pub fn with_day(mut self, date: NaiveDate, reply: DayReply) -> Self {
        self.days.insert(date, reply);
        self
    }

    pub fn with_summary(mut self, summary: Result<Option<Spo2Summary>, u16>) -> Self {
        self.summary = summary;
        self
    }

    pub fn fetched_days(&self) -> Vec<NaiveDate> {
        self.fetched_days.lock().unwrap().clone()
    }

    pub fn login_count(&self) -> usize {
        self.login_emails.lock().unwrap().len()
    }

    pub fn dump_count(&self) -> usize {
        self.dumped_to.lock().unwrap().len()
    }
}

pub fn http(status: u16) -> ProviderError {
    HttpSnafu {
        status,
        url: "https://connectapi.test/endpoint",
        message: "scripted",
    }
    .build()
}

pub fn rejected() -> ProviderError {
    AuthenticationSnafu {
        message: "email or password rejected",
    }
    .build()
}

pub fn offline() -> ProviderError {
    ConnectionSnafu {
        message: "connection refused",
    }
    .build()
}

#[async_trait]
impl TrackerApi for MockTracker {
    async fn load_session(&mut self, token_store: &Path) -> Result<(), ProviderError> {
        match self.stored {
            StoredSession::Valid => Ok(()),
            StoredSession::Missing => MissingTokensSnafu {
                path: token_store.join("oauth2_token.json"),
            }
            .fail(),
            StoredSession::Rejected => Err(http(401)),
            StoredSession::Offline => Err(offline()),
        }
    }

    async fn login(
        &mut self,
        email: &str,
        _password: &SecretString,
    ) -> Result<LoginOutcome, ProviderError> {
        self.login_emails.lock().unwrap().push(email.to_string());
        self.logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(LoginOutcome::Authenticated))
    }

    async fn resume_login(
        &mut self,
        _challenge: &MfaChallenge,
        code: &str,
    ) -> Result<(), ProviderError> {
        self.mfa_codes.lock().unwrap().push(code.to_string());
        self.mfa.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn dump_session(&self, token_store: &Path) -> Result<(), ProviderError> {
        self.dumped_to
            .lock()
            .unwrap()
            .push(token_store.to_path_buf());
        Ok(())
    }

    async fn fetch_spo2_summary(
        &self,
        _day: NaiveDate,
    ) -> Result<Option<Spo2Summary>, ProviderError> {
        self.summary.clone().map_err(http)
    }

    async fn fetch_sleep_data(&self, day: NaiveDate) -> Result<Option<SleepData>, ProviderError> {
        self.fetched_days.lock().unwrap().push(day);
        match self.days.get(&day) {
            Some(DayReply::Data(data)) => Ok(Some(data.clone())),
            Some(DayReply::Empty) | None => Ok(None),
            Some(DayReply::Status(status)) => Err(http(*status)),
            Some(DayReply::Hang) => std::future::pending().await,
        }
    }
}

/// Stdin stand-in whose reads block until the returned sender is dropped.
pub struct Stalled(mpsc::Receiver<()>);

impl Stalled {
    pub fn new() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self(rx))
    }
}

impl Read for Stalled {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}

/// Prompt answering from a script. `None` entries cancel.
pub struct ScriptedPrompt {
    answers: VecDeque<Option<String>>,
    pub asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[Option<&str>]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.map(str::to_string)).collect(),
            asked: Vec::new(),
        }
    }

    pub fn silent() -> Self {
        Self::new(&[])
    }

    fn next(&mut self, label: &str) -> Result<String, PromptError> {
        self.asked.push(label.to_string());
        match self.answers.pop_front() {
            Some(Some(answer)) => Ok(answer),
            Some(None) => Err(PromptError::Cancelled),
            None => panic!("unexpected prompt: {label}"),
        }
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn ask(&mut self, label: &str) -> Result<String, PromptError> {
        self.next(label)
    }

    async fn ask_secret(&mut self, label: &str) -> Result<SecretString, PromptError> {
        self.next(label).map(SecretString::from)
    }
}

/// In-memory wellness log.
pub struct MockWellness {
    pub existing: Option<WellnessRecord>,
    pub put_status: Option<u16>,
    pub puts: Mutex<Vec<WellnessRecord>>,
}

impl MockWellness {
    pub fn new(existing: Option<WellnessRecord>) -> Self {
        Self {
            existing,
            put_status: None,
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_put(&self) -> Option<WellnessRecord> {
        self.puts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl WellnessService for MockWellness {
    async fn wellness(&self, date: NaiveDate) -> Result<WellnessRecord, ProviderError> {
        match &self.existing {
            Some(record) if record.id == date => Ok(record.clone()),
            _ => Err(http(404)),
        }
    }

    async fn put_wellness(&self, record: &WellnessRecord) -> Result<WellnessRecord, ProviderError> {
        if let Some(status) = self.put_status {
            return Err(http(status));
        }
        self.puts.lock().unwrap().push(record.clone());
        Ok(record.clone())
    }
}
