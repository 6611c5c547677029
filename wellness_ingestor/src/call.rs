//! Failure-classifying wrapper around remote calls.
//!
//! [`safe_call`] drives any provider future to completion and never lets an
//! error or panic escape: the result is always an [`ApiOutcome`]. Failures are
//! sorted into an [`ErrorCategory`] with a human-readable message, so callers
//! can log and move on instead of unwinding.
//!
//! HTTP failures are classified by their status code. Errors that carry no
//! structured status fall back to a search of their text for the same codes, in
//! the same priority order.
//!
//! ```
//! use wellness_ingestor::call::{ErrorCategory, safe_call};
//! use wellness_ingestor::providers::{HttpSnafu, ProviderError};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! let outcome = rt.block_on(safe_call(async {
//!     HttpSnafu { status: 404u16, url: "https://api/x", message: "" }.fail::<()>()
//! }));
//! assert_eq!(outcome.category(), Some(ErrorCategory::NotFound));
//! # let _: Option<ProviderError> = None;
//! ```

use std::{any::Any, fmt, future::Future, panic::AssertUnwindSafe};

use futures::FutureExt;

use crate::providers::ProviderError;

/// What went wrong with a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 400; usually a feature not enabled for the account.
    BadRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 429.
    RateLimited,
    /// HTTP 500.
    ServerError,
    /// HTTP 503.
    ServiceUnavailable,
    /// Any other HTTP failure.
    HttpError,
    /// No persisted session on disk.
    MissingCredentials,
    /// Credentials or session rejected.
    Authentication,
    /// The request never got an HTTP answer (DNS, refused, timeout).
    Connection,
    /// Client-side throttling, as opposed to an HTTP 429 from the server.
    TooManyRequests,
    /// Anything else, including panics inside the call.
    Unexpected,
}

/// HTTP statuses with a dedicated category, in classification priority order.
const HTTP_CATEGORIES: [(u16, ErrorCategory); 7] = [
    (400, ErrorCategory::BadRequest),
    (401, ErrorCategory::Unauthorized),
    (403, ErrorCategory::Forbidden),
    (404, ErrorCategory::NotFound),
    (429, ErrorCategory::RateLimited),
    (500, ErrorCategory::ServerError),
    (503, ErrorCategory::ServiceUnavailable),
];

impl ErrorCategory {
    /// Stable kebab-case label, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::BadRequest => "bad-request",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::Forbidden => "forbidden",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::RateLimited => "rate-limited",
            ErrorCategory::ServerError => "server-error",
            ErrorCategory::ServiceUnavailable => "service-unavailable",
            ErrorCategory::HttpError => "http-error",
            ErrorCategory::MissingCredentials => "missing-credentials",
            ErrorCategory::Authentication => "authentication-error",
            ErrorCategory::Connection => "connection-error",
            ErrorCategory::TooManyRequests => "too-many-requests",
            ErrorCategory::Unexpected => "unexpected-error",
        }
    }

    /// Whether trying again later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited
                | ErrorCategory::ServerError
                | ErrorCategory::ServiceUnavailable
                | ErrorCategory::Connection
                | ErrorCategory::TooManyRequests
        )
    }

    fn from_http(status: Option<u16>, text: &str) -> Self {
        match status {
            Some(status) => HTTP_CATEGORIES
                .iter()
                .find(|(code, _)| *code == status)
                .map_or(ErrorCategory::HttpError, |(_, category)| *category),
            None => HTTP_CATEGORIES
                .iter()
                .find(|(code, _)| text.contains(&code.to_string()))
                .map_or(ErrorCategory::HttpError, |(_, category)| *category),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl ApiFailure {
    fn new(category: ErrorCategory, detail: &dyn fmt::Display) -> Self {
        let message = match category {
            ErrorCategory::BadRequest => {
                "Endpoint not available (400 Bad Request) - the feature may not be enabled for this account".to_string()
            }
            ErrorCategory::Unauthorized => {
                "Authentication required (401 Unauthorized) - please re-authenticate".to_string()
            }
            ErrorCategory::Forbidden => {
                "Access denied (403 Forbidden) - the account may lack permission".to_string()
            }
            ErrorCategory::NotFound => {
                "Endpoint not found (404) - the feature may have moved or been removed".to_string()
            }
            ErrorCategory::RateLimited => {
                "Rate limit exceeded (429) - wait before making more requests".to_string()
            }
            ErrorCategory::ServerError => {
                "Server error (500) - the remote service is having problems".to_string()
            }
            ErrorCategory::ServiceUnavailable => {
                "Service unavailable (503) - the remote service is temporarily down".to_string()
            }
            ErrorCategory::HttpError => format!("HTTP error: {detail}"),
            ErrorCategory::MissingCredentials => {
                "No valid tokens found - log in with email and password to create new tokens"
                    .to_string()
            }
            ErrorCategory::Authentication => format!("Authentication issue: {detail}"),
            ErrorCategory::Connection => format!("Connection issue: {detail}"),
            ErrorCategory::TooManyRequests => format!("Rate limit exceeded: {detail}"),
            ErrorCategory::Unexpected => format!("Unexpected error: {detail}"),
        };
        Self { category, message }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

impl From<&ProviderError> for ApiFailure {
    fn from(err: &ProviderError) -> Self {
        ApiFailure::new(classify(err), err)
    }
}

/// Maps a provider error onto its category.
pub fn classify(err: &ProviderError) -> ErrorCategory {
    match err {
        ProviderError::MissingTokens { .. } => ErrorCategory::MissingCredentials,
        ProviderError::TokenIo { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            ErrorCategory::MissingCredentials
        }
        ProviderError::Authentication { .. } => ErrorCategory::Authentication,
        ProviderError::TooManyRequests { .. } => ErrorCategory::TooManyRequests,
        ProviderError::Connection { .. } => ErrorCategory::Connection,
        ProviderError::Http { status, .. } => ErrorCategory::from_http(Some(*status), ""),
        ProviderError::Api { message, .. } => ErrorCategory::from_http(None, message),
        ProviderError::Reqwest { source, .. } => match source.status() {
            Some(status) => ErrorCategory::from_http(Some(status.as_u16()), ""),
            None if source.is_connect() || source.is_timeout() || source.is_request() => {
                ErrorCategory::Connection
            }
            None if source.is_decode() => ErrorCategory::Unexpected,
            None => ErrorCategory::from_http(None, &source.to_string()),
        },
        _ => ErrorCategory::Unexpected,
    }
}

/// Either the call's value or its classified failure.
///
/// Exactly one side is present: a success never carries a category, a failure
/// never carries a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Success(T),
    Failure(ApiFailure),
}

impl<T> ApiOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            ApiOutcome::Success(value) => Some(value),
            ApiOutcome::Failure(_) => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            ApiOutcome::Success(_) => None,
            ApiOutcome::Failure(failure) => Some(failure.category),
        }
    }

    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            ApiOutcome::Success(_) => None,
            ApiOutcome::Failure(failure) => Some(failure),
        }
    }

    /// The `(success, payload, failure)` view of the outcome.
    pub fn into_parts(self) -> (bool, Option<T>, Option<ApiFailure>) {
        match self {
            ApiOutcome::Success(value) => (true, Some(value), None),
            ApiOutcome::Failure(failure) => (false, None, Some(failure)),
        }
    }
}

/// Runs `call` and classifies whatever comes out of it.
///
/// No retries happen here; the caller decides what a failure means.
pub async fn safe_call<T, F>(call: F) -> ApiOutcome<T>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(value)) => ApiOutcome::Success(value),
        Ok(Err(err)) => ApiOutcome::Failure(ApiFailure::from(&err)),
        Err(panic) => ApiOutcome::Failure(ApiFailure::new(
            ErrorCategory::Unexpected,
            &panic_message(panic.as_ref()),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with a non-string payload".to_string())
}
