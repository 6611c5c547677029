//! Tracker session acquisition.
//!
//! [`acquire_session`] first tries the persisted session in the token store and only
//! falls back to an interactive login when that fails. A fresh login, with or without
//! an MFA round, is written back to the token store straight away; a reused session is
//! never rewritten.

use std::{
    io::{self, BufRead, BufReader, IsTerminal, Write},
    path::Path,
    thread,
};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use wellness_ingestor::{
    call::{ApiFailure, ApiOutcome, ErrorCategory, safe_call},
    providers::{LoginOutcome, MfaChallenge, TrackerApi},
};

use crate::config::Credentials;

/// Why the user could not be asked for input.
#[derive(thiserror::Error, Debug)]
pub enum PromptError {
    /// End of input, or the read was abandoned.
    #[error("input cancelled")]
    Cancelled,
    /// The terminal could not be read or written.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Interactive input used during login.
#[async_trait]
pub trait Prompt: Send {
    /// Asks for a visible value, such as an email or an MFA code.
    async fn ask(&mut self, label: &str) -> Result<String, PromptError>;

    /// Asks for a secret value.
    async fn ask_secret(&mut self, label: &str) -> Result<SecretString, PromptError>;
}

/// [`Prompt`] reading lines from standard input.
///
/// Each read runs on its own OS thread, so a prompt abandoned mid-read never keeps
/// the runtime alive. Secrets are read without echo when stdin is a terminal. End of
/// input counts as cancellation; after an abandoned read the prompt stays spent.
pub struct StdinPrompt {
    input: Option<LineReader>,
    hide_secrets: bool,
}

type LineReader = Box<dyn BufRead + Send>;

impl StdinPrompt {
    /// Wraps the process's standard input.
    pub fn new() -> Self {
        let stdin = io::stdin();
        let hide_secrets = stdin.is_terminal();
        Self {
            input: Some(Box::new(BufReader::new(stdin))),
            hide_secrets,
        }
    }

    /// Answers from `reader`. Secrets are read as plain lines.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self {
            input: Some(Box::new(reader)),
            hide_secrets: false,
        }
    }

    async fn read(&mut self, label: &str, secret: bool) -> Result<String, PromptError> {
        let Some(mut input) = self.input.take() else {
            return Err(PromptError::Cancelled);
        };
        let label = label.to_owned();
        let hidden = secret && self.hide_secrets;

        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name("spo2-sync-prompt".into())
            .spawn(move || {
                let line = if hidden {
                    rpassword::prompt_password(&label).map(Some)
                } else {
                    read_line(&mut *input, &label)
                };
                let _ = tx.send((line, input));
            })?;

        let (line, input) = rx.await.map_err(|_| PromptError::Cancelled)?;
        self.input = Some(input);
        match line {
            Ok(Some(line)) => Ok(line.trim().to_string()),
            Ok(None) => Err(PromptError::Cancelled),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(PromptError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_line(input: &mut dyn BufRead, label: &str) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.write_all(label.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    match input.read_line(&mut line)? {
        0 => Ok(None),
        _ => Ok(Some(line)),
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompt for StdinPrompt {
    async fn ask(&mut self, label: &str) -> Result<String, PromptError> {
        self.read(label, false).await
    }

    async fn ask_secret(&mut self, label: &str) -> Result<SecretString, PromptError> {
        self.read(label, true).await.map(SecretString::from)
    }
}

/// Failures that end the run.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The tracker is throttling MFA attempts.
    #[error("too many MFA attempts, wait about 30 minutes before trying again: {0}")]
    MfaRateLimited(ApiFailure),
    /// MFA could not be completed for a reason other than a wrong code.
    #[error("MFA authentication failed: {0}")]
    MfaFailed(ApiFailure),
    /// Every allowed code was rejected.
    #[error("MFA code rejected {attempts} times, giving up")]
    MfaAttemptsExhausted {
        /// Codes tried.
        attempts: u32,
    },
}

/// Non-fatal results of [`acquire_session`].
#[derive(Debug, PartialEq)]
pub enum SessionOutcome {
    /// The client holds a live session.
    Acquired {
        /// Whether it came from the token store rather than a fresh login.
        reused: bool,
    },
    /// Login could not reach the tracker, or failed in a way retrying won't fix.
    Unavailable(ApiFailure),
    /// The user backed out of a prompt.
    Cancelled,
}

/// What [`acquire_session`] needs besides the client.
pub struct SessionRequest<'a> {
    /// Token store directory.
    pub token_store: &'a Path,
    /// Wrong MFA codes tolerated.
    pub mfa_max_attempts: u32,
    /// Configured login pair, if any. Prompted for when absent or rejected.
    pub credentials: Option<Credentials>,
}

/// Leaves `client` authenticated, or says why it is not.
pub async fn acquire_session<C>(
    client: &mut C,
    request: SessionRequest<'_>,
    prompt: &mut dyn Prompt,
) -> Result<SessionOutcome, SessionError>
where
    C: TrackerApi + ?Sized,
{
    report_token_store(request.token_store).await;

    match safe_call(client.load_session(request.token_store)).await {
        ApiOutcome::Success(()) => {
            info!("logged in with stored session");
            return Ok(SessionOutcome::Acquired { reused: true });
        }
        ApiOutcome::Failure(failure) => {
            info!(category = %failure.category, "{}", failure.message);
            info!("no usable stored session, requesting fresh login credentials");
        }
    }

    let mut pending = request.credentials;
    loop {
        let credentials = match pending.take() {
            Some(credentials) => credentials,
            None => match prompt_credentials(prompt).await {
                Ok(credentials) => credentials,
                Err(e) => return Ok(cancelled(e)),
            },
        };

        info!(email = %credentials.email, "logging in with credentials");
        let login = safe_call(client.login(&credentials.email, &credentials.password)).await;
        match login {
            ApiOutcome::Success(LoginOutcome::Authenticated) => {}
            ApiOutcome::Success(LoginOutcome::NeedsMfa(challenge)) => {
                info!("multi-factor authentication required");
                match complete_mfa(client, &challenge, request.mfa_max_attempts, prompt).await? {
                    MfaStep::Done => {}
                    MfaStep::Stop(outcome) => return Ok(outcome),
                }
            }
            ApiOutcome::Failure(failure) if failure.category == ErrorCategory::Authentication => {
                warn!("{}", failure.message);
                continue;
            }
            ApiOutcome::Failure(failure) => {
                error!(category = %failure.category, "{}", failure.message);
                return Ok(SessionOutcome::Unavailable(failure));
            }
        }

        persist(client, request.token_store).await;
        return Ok(SessionOutcome::Acquired { reused: false });
    }
}

enum MfaStep {
    Done,
    Stop(SessionOutcome),
}

async fn complete_mfa<C>(
    client: &mut C,
    challenge: &MfaChallenge,
    max_attempts: u32,
    prompt: &mut dyn Prompt,
) -> Result<MfaStep, SessionError>
where
    C: TrackerApi + ?Sized,
{
    let mut attempts = 0;
    loop {
        let code = match prompt.ask("Please enter your MFA code: ").await {
            Ok(code) => code,
            Err(e) => return Ok(MfaStep::Stop(cancelled(e))),
        };
        attempts += 1;
        info!(attempt = attempts, "submitting MFA code");

        let failure = match safe_call(client.resume_login(challenge, &code)).await {
            ApiOutcome::Success(()) => {
                info!("MFA authentication successful");
                return Ok(MfaStep::Done);
            }
            ApiOutcome::Failure(failure) => failure,
        };

        match failure.category {
            ErrorCategory::RateLimited | ErrorCategory::TooManyRequests => {
                return Err(SessionError::MfaRateLimited(failure));
            }
            ErrorCategory::Unauthorized
            | ErrorCategory::Forbidden
            | ErrorCategory::Authentication => {
                if attempts >= max_attempts {
                    return Err(SessionError::MfaAttemptsExhausted { attempts });
                }
                warn!(
                    remaining = max_attempts - attempts,
                    "invalid MFA code, verify it and try again"
                );
            }
            ErrorCategory::Connection => {
                error!("{}", failure.message);
                return Ok(MfaStep::Stop(SessionOutcome::Unavailable(failure)));
            }
            _ => return Err(SessionError::MfaFailed(failure)),
        }
    }
}

async fn prompt_credentials(prompt: &mut dyn Prompt) -> Result<Credentials, PromptError> {
    let email = prompt.ask("Login email: ").await?;
    let password = prompt.ask_secret("Enter password: ").await?;
    Ok(Credentials { email, password })
}

fn cancelled(e: PromptError) -> SessionOutcome {
    match e {
        PromptError::Cancelled => info!("cancelled by user"),
        PromptError::Io(e) => {
            warn!(error = %e, "cannot read from the terminal, treating as cancelled")
        }
    }
    SessionOutcome::Cancelled
}

/// Writes the session; a failure is logged but does not undo the login.
async fn persist<C>(client: &C, token_store: &Path)
where
    C: TrackerApi + ?Sized,
{
    match client.dump_session(token_store).await {
        Ok(()) => info!(path = %token_store.display(), "authentication tokens saved"),
        Err(e) => warn!(
            path = %token_store.display(),
            error = %e,
            "could not save authentication tokens"
        ),
    }
}

async fn report_token_store(token_store: &Path) {
    let mut entries = match tokio::fs::read_dir(token_store).await {
        Ok(entries) => entries,
        Err(_) => {
            info!(path = %token_store.display(), "no existing token directory found");
            return;
        }
    };
    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    if names.is_empty() {
        info!(path = %token_store.display(), "token directory exists but no token files found");
    } else {
        names.sort();
        info!(count = names.len(), files = ?names, "found token files");
    }
}
