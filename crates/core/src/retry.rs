//! Error classification and retry policies
//!
//! The B2 API reports failures as `{status, code, message}`. [`is_fatal`]
//! decides which of those a retry can fix; a [`RetryPolicy`] decides how many
//! retries are made and how long to wait between them.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Classify a service error by HTTP status and error code
///
/// Only an expired token, a request timeout and server-side failures are
/// worth retrying. Everything else is reported as-is.
pub fn is_fatal(status: u16, code: &str) -> bool {
    match status {
        401 => match code {
            "expired_auth_token" => false,
            "missing_auth_token" | "bad_auth_token" => true,
            _ => true,
        },
        408 => false,
        500..=599 => false,
        _ => true,
    }
}

/// Decides whether a failed attempt is retried
#[cfg_attr(test, mockall::automock)]
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up
    ///
    /// `attempt` is the number of attempts made so far (starting at 1).
    fn next_delay(&self, attempt: u32, error: &Error) -> Option<Duration>;
}

/// Retry exactly once, immediately, after a retryable error
///
/// This recovers from an expired session token without masking
/// persistent failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRetry;

impl RetryPolicy for SingleRetry {
    fn next_delay(&self, attempt: u32, error: &Error) -> Option<Duration> {
        (attempt < 2 && error.is_retryable()).then_some(Duration::ZERO)
    }
}

/// Never retry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &Error) -> Option<Duration> {
        None
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy for Backoff {
    fn next_delay(&self, attempt: u32, error: &Error) -> Option<Duration> {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return None;
        }
        Some(self.calculate_backoff(attempt))
    }
}

impl Backoff {
    /// Calculate backoff duration with jitter
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        // Exponential backoff: initial * 2^(attempt-1)
        let base_ms = self.initial_backoff_ms * (1u64 << (attempt - 1).min(10));
        let capped_ms = base_ms.min(self.max_backoff_ms);

        let jitter_ms = rand_jitter(capped_ms);
        Duration::from_millis(capped_ms + jitter_ms)
    }
}

/// Generate pseudo-random jitter without external RNG dependency
fn rand_jitter(max: u64) -> u64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max.max(1)
}

/// Run a fallible async operation under a retry policy
///
/// # Example
/// ```ignore
/// let result = retry_with_policy(
///     &SingleRetry,
///     || async { client.call("b2_list_buckets", &request).await },
/// ).await;
/// ```
pub async fn retry_with_policy<T, F, Fut>(policy: &dyn RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let Some(delay) = policy.next_delay(attempt, &e) else {
                    return Err(e);
                };

                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Retrying after transient error"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Builder for a [`Backoff`] policy
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn build(self) -> Backoff {
        Backoff {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn service(status: u16, code: &str) -> Error {
        Error::Service(ServiceError::new(status, code, "test"))
    }

    #[test]
    fn test_classifier_table() {
        assert!(!is_fatal(401, "expired_auth_token"));
        assert!(is_fatal(401, "missing_auth_token"));
        assert!(is_fatal(401, "bad_auth_token"));
        assert!(is_fatal(401, "unauthorized"));
        assert!(!is_fatal(408, "request_timeout"));
        assert!(!is_fatal(408, ""));
        assert!(!is_fatal(500, "internal_error"));
        assert!(!is_fatal(503, "service_unavailable"));
        assert!(!is_fatal(599, "anything"));
        assert!(is_fatal(400, "bad_request"));
        assert!(is_fatal(403, "cap_exceeded"));
        assert!(is_fatal(404, "not_found"));
        assert!(is_fatal(429, "too_many_requests"));
        assert!(is_fatal(600, "unknown"));
    }

    #[test]
    fn test_single_retry() {
        let policy = SingleRetry;
        assert_eq!(
            policy.next_delay(1, &service(401, "expired_auth_token")),
            Some(Duration::ZERO)
        );
        assert_eq!(policy.next_delay(2, &service(401, "expired_auth_token")), None);
        assert_eq!(policy.next_delay(1, &service(401, "bad_auth_token")), None);
        assert_eq!(
            policy.next_delay(1, &Error::Transport("reset".to_string())),
            Some(Duration::ZERO)
        );
        assert_eq!(
            policy.next_delay(1, &Error::Integrity("mismatch".to_string())),
            None
        );
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(NoRetry.next_delay(1, &service(503, "busy")), None);
    }

    #[test]
    fn test_calculate_backoff() {
        let policy = Backoff {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
        };

        let b1 = policy.calculate_backoff(1);
        assert!(b1.as_millis() >= 100 && b1.as_millis() < 200);

        let b2 = policy.calculate_backoff(2);
        assert!(b2.as_millis() >= 200 && b2.as_millis() < 400);

        let b3 = policy.calculate_backoff(3);
        assert!(b3.as_millis() >= 400 && b3.as_millis() < 800);
    }

    #[test]
    fn test_backoff_cap() {
        let policy = Backoff {
            max_attempts: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };

        let b = policy.calculate_backoff(10);
        assert!(b.as_millis() <= 10000); // max + jitter
    }

    #[test]
    fn test_backoff_gives_up() {
        let policy = RetryBuilder::new()
            .max_attempts(2)
            .initial_backoff_ms(1)
            .build();
        assert!(policy.next_delay(1, &service(500, "internal_error")).is_some());
        assert!(policy.next_delay(2, &service(500, "internal_error")).is_none());
        assert!(policy.next_delay(1, &service(400, "bad_request")).is_none());
    }

    #[test]
    fn test_retry_builder() {
        let policy = RetryBuilder::new()
            .max_attempts(5)
            .initial_backoff_ms(200)
            .max_backoff_ms(20000)
            .build();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff_ms, 200);
        assert_eq!(policy.max_backoff_ms, 20000);
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let mut policy = MockRetryPolicy::new();
        policy.expect_next_delay().never();
        let mut calls = 0;

        let result = retry_with_policy(&policy, || {
            calls += 1;
            async { Ok::<_, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_consults_policy_once() {
        let mut policy = MockRetryPolicy::new();
        policy
            .expect_next_delay()
            .withf(|attempt, e| *attempt == 1 && e.is_retryable())
            .times(1)
            .return_const(Some(Duration::ZERO));

        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let result = retry_with_policy(&policy, || {
            let cc = counter.clone();
            async move {
                if cc.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(service(401, "expired_auth_token"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_retry_surfaces_second_error() {
        let mut calls = 0;

        let result: Result<()> = retry_with_policy(&SingleRetry, || {
            calls += 1;
            let code = if calls == 1 { "internal_error" } else { "bad_request" };
            let status = if calls == 1 { 500 } else { 400 };
            async move { Err(service(status, code)) }
        })
        .await;

        match result {
            Err(Error::Service(e)) => assert_eq!(e.code, "bad_request"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_retry_non_retryable() {
        let mut calls = 0;

        let result: Result<()> = retry_with_policy(&SingleRetry, || {
            calls += 1;
            async { Err(Error::NotFound("not found".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_backoff_exhausted() {
        let policy = Backoff {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
        };
        let mut calls = 0;

        let result: Result<()> = retry_with_policy(&policy, || {
            calls += 1;
            async { Err(Error::Transport("always fails".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
