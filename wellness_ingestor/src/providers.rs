//! Provider abstraction for the fitness-tracking service.
//!
//! This module defines the [`TrackerApi`] trait, the capability surface the sync
//! pipeline needs from the tracker: session handling (load, login, MFA resume,
//! dump) and the two SpO2 reads. [`connect_rest::ConnectProvider`] implements it
//! over HTTP; tests implement it with scripted responses.
//!
//! The trait is designed for async usage and supports dynamic dispatch
//! (`dyn TrackerApi`).
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//!
//! use async_trait::async_trait;
//! use chrono::NaiveDate;
//! use secrecy::SecretString;
//! use wellness_ingestor::models::spo2::{SleepData, Spo2Summary};
//! use wellness_ingestor::providers::{LoginOutcome, MfaChallenge, ProviderError, TrackerApi};
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl TrackerApi for Offline {
//!     async fn load_session(&mut self, _: &Path) -> Result<(), ProviderError> { Ok(()) }
//!     async fn login(&mut self, _: &str, _: &SecretString) -> Result<LoginOutcome, ProviderError> {
//!         Ok(LoginOutcome::Authenticated)
//!     }
//!     async fn resume_login(&mut self, _: &MfaChallenge, _: &str) -> Result<(), ProviderError> { Ok(()) }
//!     async fn dump_session(&self, _: &Path) -> Result<(), ProviderError> { Ok(()) }
//!     async fn fetch_spo2_summary(&self, _: NaiveDate) -> Result<Option<Spo2Summary>, ProviderError> {
//!         Ok(None)
//!     }
//!     async fn fetch_sleep_data(&self, _: NaiveDate) -> Result<Option<SleepData>, ProviderError> {
//!         Ok(None)
//!     }
//! }
//! ```

pub mod connect_rest;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use snafu::{Backtrace, Snafu};

use crate::models::spo2::{SleepData, Spo2Summary};

/// Result of submitting email/password to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The session is live.
    Authenticated,
    /// A one-time code is required; pass the challenge to [`TrackerApi::resume_login`].
    NeedsMfa(MfaChallenge),
}

/// Opaque state carried between a login that asked for MFA and its resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaChallenge {
    pub ticket: String,
}

/// The tracker capabilities the sync pipeline depends on.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Loads a persisted session from `token_store` and checks that the service still accepts it.
    async fn load_session(&mut self, token_store: &Path) -> Result<(), ProviderError>;

    /// Submits credentials. May ask for a second factor.
    async fn login(
        &mut self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, ProviderError>;

    /// Completes a login that asked for MFA.
    async fn resume_login(
        &mut self,
        challenge: &MfaChallenge,
        code: &str,
    ) -> Result<(), ProviderError>;

    /// Persists the current session to `token_store`.
    async fn dump_session(&self, token_store: &Path) -> Result<(), ProviderError>;

    /// Daily SpO2 summary for `day`. `None` when the service has nothing for that day.
    async fn fetch_spo2_summary(
        &self,
        day: NaiveDate,
    ) -> Result<Option<Spo2Summary>, ProviderError>;

    /// Sleep data, including epoch-level SpO2 samples, for `day`.
    async fn fetch_sleep_data(&self, day: NaiveDate) -> Result<Option<SleepData>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// A configured endpoint is not a valid absolute URL.
    #[snafu(display("Invalid base URL {url:?}: {message}"))]
    InvalidBaseUrl {
        url: String,
        message: String,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a provider implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// The service answered with a non-success HTTP status.
    #[snafu(display("HTTP {status} from {url}: {message}"))]
    Http {
        status: u16,
        url: String,
        message: String,
        backtrace: Backtrace,
    },

    /// The provider's API returned an error without a structured status.
    #[snafu(display("API error: {message}"))]
    Api {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The service could not be reached.
    #[snafu(display("Connection failed: {message}"))]
    Connection {
        message: String,
        backtrace: Backtrace,
    },

    /// No persisted session exists at the token store.
    #[snafu(display("No token file found at {}", path.display()))]
    MissingTokens { path: PathBuf, backtrace: Backtrace },

    /// Credentials or a stored session were rejected.
    #[snafu(display("Authentication failed: {message}"))]
    Authentication {
        message: String,
        backtrace: Backtrace,
    },

    /// The client refused to send more requests for now.
    #[snafu(display("Too many requests: {message}"))]
    TooManyRequests {
        message: String,
        backtrace: Backtrace,
    },

    /// A response body or token file could not be decoded.
    #[snafu(display("Failed to decode {what}: {source}"))]
    Decode {
        what: String,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// Reading or writing the token store failed.
    #[snafu(display("Token store I/O failed for {}: {source}", path.display()))]
    TokenIo {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// An internal error occurred while processing data within the provider.
    #[snafu(display("Internal provider error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// The HTTP status behind this error, when one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Reqwest { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Checks that `url` parses as an absolute URL and strips any trailing slash.
pub(crate) fn normalize_base_url(url: &str) -> Result<String, ProviderInitError> {
    reqwest::Url::parse(url).map_err(|e| {
        InvalidBaseUrlSnafu {
            url,
            message: e.to_string(),
        }
        .build()
    })?;
    Ok(url.trim_end_matches('/').to_string())
}
