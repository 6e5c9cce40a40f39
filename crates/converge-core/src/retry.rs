//! Bounded retry with exponential backoff and jitter
//!
//! Every remote call goes through [`call`]. Transient failures are retried
//! until the attempt budget runs out, at which point the last failure is
//! surfaced as [`ReconcileError::RetriesExhausted`]. Nothing loops forever.

use crate::error::{CallContext, ReconcileError, Result};
use crate::status::{CallOutcome, FatalCause, RemoteError, StatusCode, classify};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry configuration for remote calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Relative jitter applied to each delay, in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based), before jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay after the given failed attempt with jitter applied. `sample` is
    /// a uniform draw from `[-1, 1]`.
    pub fn jittered(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.backoff(attempt).as_secs_f64();
        let spread = self.jitter.clamp(0.0, 1.0) * sample.clamp(-1.0, 1.0);
        let secs = (base * (1.0 + spread)).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Run `attempt` until it succeeds, fails fatally, or the budget runs out.
///
/// `request` is the rendered request, attached to `InvalidArgument` failures.
/// A `NotFound` outcome becomes [`ReconcileError::NotFound`]; callers that
/// treat absence as a signal match on it.
pub async fn call<T, F, Fut>(
    config: &RetryConfig,
    context: &CallContext,
    request: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RemoteError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match classify(attempt().await, || request.to_string()) {
            CallOutcome::Success(value) => return Ok(value),
            CallOutcome::NotFound => {
                return Err(ReconcileError::NotFound {
                    context: context.clone(),
                });
            }
            CallOutcome::Fatal {
                code,
                cause,
                message,
            } => {
                let context = context.clone();
                return Err(match cause {
                    FatalCause::Credentials => ReconcileError::Credentials {
                        context,
                        code,
                        message,
                    },
                    FatalCause::InvalidArgument { request } => ReconcileError::InvalidArgument {
                        context,
                        message,
                        request,
                    },
                    FatalCause::Other => ReconcileError::Remote {
                        context,
                        code,
                        message,
                    },
                });
            }
            CallOutcome::Retryable { code, message } => {
                if attempts >= max_attempts {
                    return Err(ReconcileError::RetriesExhausted {
                        context: context.clone(),
                        attempts,
                        code,
                        message,
                    });
                }

                pause(config, context, attempts, code, &message).await;
            }
        }
    }
}

/// Sleep before the attempt following failed attempt `attempts` (1-based)
pub(crate) async fn pause(
    config: &RetryConfig,
    context: &CallContext,
    attempts: u32,
    code: StatusCode,
    message: &str,
) {
    let sample = rand::thread_rng().gen_range(-1.0..=1.0);
    let delay = config.jittered(attempts, sample);
    tracing::warn!(
        "{}: {} ({}), retrying in {:?} (attempt {}/{})",
        context,
        code,
        message,
        delay,
        attempts + 1,
        config.max_attempts.max(1)
    );
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(125),
            max_delay: Duration::from_millis(400),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = fast();
        assert_eq!(config.backoff(1), Duration::from_millis(125));
        assert_eq!(config.backoff(2), Duration::from_millis(250));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(200), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig {
            jitter: 0.5,
            ..fast()
        };
        assert_eq!(config.jittered(1, -1.0), Duration::from_micros(62_500));
        assert_eq!(config.jittered(1, 1.0), Duration::from_micros(187_500));
        // Never above the cap, even with positive jitter
        assert_eq!(config.jittered(3, 1.0), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let context = CallContext::new("read", "alert").with_id("a-1");

        let value = call(&fast(), &context, "", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RemoteError::new(StatusCode::Unavailable, "try later"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_is_terminal() {
        let calls = AtomicU32::new(0);
        let context = CallContext::new("list", "logs collection");

        let err = call(&fast(), &context, "", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RemoteError::new(StatusCode::DeadlineExceeded, "slow")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            ReconcileError::RetriesExhausted { attempts, code, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(code, StatusCode::DeadlineExceeded);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let context = CallContext::new("create", "alert");

        let err = call(&fast(), &context, "{\"name\":\"\"}", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RemoteError::new(StatusCode::InvalidArgument, "name is empty")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            ReconcileError::InvalidArgument { request, .. } => {
                assert_eq!(request, "{\"name\":\"\"}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_reported_once() {
        let context = CallContext::new("delete", "alert").with_id("gone");
        let err = call(&RetryConfig::default(), &context, "", || async {
            Err::<(), _>(RemoteError::not_found("no such alert"))
        })
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }
}
