//! Run configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults, an optional
//! TOML file, then environment variables (`ATHLETE_ID`, `API_KEY`, `DAYS_TO_FETCH`,
//! `GARMINTOKENS`, `SPO2_DB`). `EMAIL` and `PASSWORD` are read when credentials are
//! requested, see [`SyncConfig::get_credentials`].
//!
//! ```toml
//! email = "me@example.com"
//! athlete_id = "i12345"
//! days_to_fetch = 14
//! timezone = "Europe/Berlin"
//!
//! [session]
//! token_store = "~/.garminconnect"
//! mfa_max_attempts = 3
//!
//! [backfill]
//! order = "oldest_first"
//! commit = "end_of_run"
//!
//! [backfill.retry]
//! strategy = "fixed"
//! delay_ms = 2000
//! max_retries = 2
//! ```

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use secrecy::SecretString;
use serde::Deserialize;
use shared_utils::{
    config::ConfigError,
    env::{expand_home, get_env_var_opt, parse_env_var},
};
use wellness_ingestor::{
    analytics::intervals_rest::DEFAULT_BASE_URL as DEFAULT_INTERVALS_URL,
    providers::connect_rest::ConnectEndpoints,
};

use crate::retry::RetryPolicy;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "spo2_sync.toml";

const DEFAULT_DAYS_TO_FETCH: u32 = 7;
const DEFAULT_DATABASE: &str = "spo2.db3";
const DEFAULT_TOKEN_STORE: &str = "~/.garminconnect";
const DEFAULT_MFA_MAX_ATTEMPTS: u32 = 3;

/// Everything a sync run needs to know.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Tracker login email.
    pub email: Option<String>,
    /// Tracker login password.
    pub password: Option<SecretString>,
    /// Analytics athlete id.
    pub athlete_id: Option<String>,
    /// Analytics API key.
    pub api_key: Option<SecretString>,
    /// Lookback in days; the run covers `today - days_to_fetch ..= today`.
    pub days_to_fetch: u32,
    /// SQLite database file.
    pub database: PathBuf,
    /// IANA zone used to decide what "today" is. Local time when unset.
    pub timezone: Option<String>,
    /// Session handling.
    pub session: SessionSettings,
    /// Backfill behaviour.
    pub backfill: BackfillSettings,
    /// Remote base URLs.
    pub endpoints: EndpointSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            email: None,
            password: None,
            athlete_id: None,
            api_key: None,
            days_to_fetch: DEFAULT_DAYS_TO_FETCH,
            database: PathBuf::from(DEFAULT_DATABASE),
            timezone: None,
            session: SessionSettings::default(),
            backfill: BackfillSettings::default(),
            endpoints: EndpointSettings::default(),
        }
    }
}

/// `[session]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Directory holding the persisted session. `~` is expanded.
    pub token_store: PathBuf,
    /// Wrong MFA codes tolerated before giving up.
    pub mfa_max_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_store: PathBuf::from(DEFAULT_TOKEN_STORE),
            mfa_max_attempts: DEFAULT_MFA_MAX_ATTEMPTS,
        }
    }
}

/// Direction the backfill walks the date range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOrder {
    /// `today - N` first.
    #[default]
    OldestFirst,
    /// `today` first.
    NewestFirst,
}

/// When backfilled rows are committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// One commit after the last day.
    #[default]
    EndOfRun,
    /// A commit after every day.
    PerDay,
}

/// `[backfill]` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackfillSettings {
    /// Walk direction.
    pub order: DayOrder,
    /// Commit granularity.
    pub commit: CommitPolicy,
    /// Retry strategy for a day's fetch.
    pub retry: RetryPolicy,
}

/// `[endpoints]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSettings {
    /// Tracker data API.
    pub connect_api: String,
    /// Tracker sign-in service.
    pub sso: String,
    /// Analytics API.
    pub intervals: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        let tracker = ConnectEndpoints::default();
        Self {
            connect_api: tracker.api_base,
            sso: tracker.sso_base,
            intervals: DEFAULT_INTERVALS_URL.to_string(),
        }
    }
}

impl EndpointSettings {
    /// Tracker endpoints in the shape the tracker client takes.
    pub fn tracker(&self) -> ConnectEndpoints {
        ConnectEndpoints {
            api_base: self.connect_api.clone(),
            sso_base: self.sso.clone(),
        }
    }
}

/// Tracker login pair.
#[derive(Debug)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: SecretString,
}

/// Analytics account pair.
#[derive(Debug)]
pub struct AnalyticsCredentials {
    /// Athlete id, e.g. `i12345`.
    pub athlete_id: String,
    /// API key.
    pub api_key: SecretString,
}

impl SyncConfig {
    /// Reads `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, then applies environment overrides.
    ///
    /// An explicit `path` that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file without looking at the environment.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Overrides fields from the environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(id) = get_env_var_opt("ATHLETE_ID") {
            self.athlete_id = Some(id);
        }
        if let Some(key) = get_env_var_opt("API_KEY") {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(days) = parse_env_var::<u32>("DAYS_TO_FETCH")? {
            self.days_to_fetch = days;
        }
        if let Some(store) = get_env_var_opt("GARMINTOKENS") {
            self.session.token_store = PathBuf::from(store);
        }
        if let Some(db) = get_env_var_opt("SPO2_DB") {
            self.database = PathBuf::from(db);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.mfa_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "session.mfa_max_attempts".into(),
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        self.zone().map(|_| ())
    }

    /// Login pair for the tracker. `EMAIL` and `PASSWORD` override the config file.
    ///
    /// Either both values are returned or the first missing one is reported.
    pub fn get_credentials(&self) -> Result<Credentials, ConfigError> {
        let email = get_env_var_opt("EMAIL")
            .or_else(|| self.email.clone().filter(|e| !e.trim().is_empty()))
            .ok_or(ConfigError::MissingCredentials("email"))?;
        let password = match get_env_var_opt("PASSWORD") {
            Some(password) => SecretString::from(password),
            None => match &self.password {
                Some(password) if !secret_is_blank(password) => {
                    SecretString::from(expose(password).to_string())
                }
                _ => return Err(ConfigError::MissingCredentials("password")),
            },
        };
        Ok(Credentials { email, password })
    }

    /// Athlete id and API key for the analytics service.
    pub fn analytics_credentials(&self) -> Result<AnalyticsCredentials, ConfigError> {
        let athlete_id = self
            .athlete_id
            .clone()
            .ok_or(ConfigError::MissingCredentials("athlete_id"))?;
        let api_key = match &self.api_key {
            Some(key) if !secret_is_blank(key) => SecretString::from(expose(key).to_string()),
            _ => return Err(ConfigError::MissingCredentials("api_key")),
        };
        Ok(AnalyticsCredentials {
            athlete_id,
            api_key,
        })
    }

    /// Token store directory with `~` expanded.
    pub fn token_store(&self) -> PathBuf {
        expand_home(&self.session.token_store)
    }

    fn zone(&self) -> Result<Option<Tz>, ConfigError> {
        self.timezone
            .as_deref()
            .map(|name| {
                Tz::from_str(name).map_err(|e| ConfigError::InvalidValue {
                    name: "timezone".into(),
                    value: name.into(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// The current date in the configured zone (local time when unset).
    pub fn today(&self) -> Result<NaiveDate, ConfigError> {
        Ok(match self.zone()? {
            Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
            None => chrono::Local::now().date_naive(),
        })
    }
}

fn expose(secret: &SecretString) -> &str {
    use secrecy::ExposeSecret;
    secret.expose_secret()
}

fn secret_is_blank(secret: &SecretString) -> bool {
    expose(secret).trim().is_empty()
}
