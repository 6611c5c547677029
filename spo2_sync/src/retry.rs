//! Retry strategies for per-day fetches.
//!
//! The default is [`RetryPolicy::None`]: a failed day is logged and skipped.
//! The other strategies only re-issue calls whose failure category is retryable
//! (see [`ErrorCategory::is_retryable`](wellness_ingestor::call::ErrorCategory::is_retryable)).

use std::{future::Future, time::Duration};

use serde::Deserialize;
use tracing::warn;
use wellness_ingestor::call::ApiOutcome;

/// How often, and how long apart, a failed call is re-issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Single attempt.
    #[default]
    None,
    /// Constant delay between attempts.
    Fixed {
        /// Delay before each retry.
        delay_ms: u64,
        /// Retries after the first attempt.
        max_retries: u32,
    },
    /// `base_delay_ms * 2^attempt` before each retry.
    Exponential {
        /// Delay before the first retry.
        base_delay_ms: u64,
        /// Retries after the first attempt.
        max_retries: u32,
    },
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` once retries are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed {
                delay_ms,
                max_retries,
            } => (attempt < max_retries).then(|| Duration::from_millis(delay_ms)),
            RetryPolicy::Exponential {
                base_delay_ms,
                max_retries,
            } => (attempt < max_retries).then(|| {
                let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                Duration::from_millis(base_delay_ms.saturating_mul(factor))
            }),
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable category, or retries run out.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> ApiOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiOutcome<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = call().await;
            let category = match outcome.category() {
                Some(category) if category.is_retryable() => category,
                _ => return outcome,
            };
            let Some(delay) = self.delay_for(attempt) else {
                return outcome;
            };
            warn!(%category, attempt = attempt + 1, ?delay, "retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use wellness_ingestor::{
        call::{ErrorCategory, safe_call},
        providers::{HttpSnafu, ProviderError},
    };

    fn status(code: u16) -> ProviderError {
        HttpSnafu {
            status: code,
            url: "http://x",
            message: "",
        }
        .build()
    }

    #[test]
    fn delays_follow_the_strategy() {
        assert_eq!(RetryPolicy::None.delay_for(0), None);

        let fixed = RetryPolicy::Fixed {
            delay_ms: 250,
            max_retries: 2,
        };
        assert_eq!(fixed.delay_for(0), Some(Duration::from_millis(250)));
        assert_eq!(fixed.delay_for(1), Some(Duration::from_millis(250)));
        assert_eq!(fixed.delay_for(2), None);

        let exp = RetryPolicy::Exponential {
            base_delay_ms: 100,
            max_retries: 3,
        };
        let delays: Vec<_> = (0..4).map(|a| exp.delay_for(a)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(400)),
                None
            ]
        );
    }

    #[test]
    fn policy_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            retry: RetryPolicy,
        }
        let w: Wrapper = toml::from_str(
            r#"
            [retry]
            strategy = "exponential"
            base_delay_ms = 500
            max_retries = 4
            "#,
        )
        .unwrap();
        assert_eq!(
            w.retry,
            RetryPolicy::Exponential {
                base_delay_ms: 500,
                max_retries: 4
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_are_retried_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::Fixed {
            delay_ms: 1_000,
            max_retries: 5,
        };
        let outcome = policy
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                safe_call(async move { if n < 3 { Err(status(503)) } else { Ok(n) } })
            })
            .await;
        assert_eq!(outcome.payload(), Some(&3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::Exponential {
            base_delay_ms: 10,
            max_retries: 5,
        };
        let outcome: ApiOutcome<()> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                safe_call(async { Err(status(404)) })
            })
            .await;
        assert_eq!(outcome.category(), Some(ErrorCategory::NotFound));
        assert_eq!(calls.get(), 1);
    }
}
