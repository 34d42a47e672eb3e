//! Binding-level retry. The engine itself never retries.

use async_trait::async_trait;
use musubi_core::{Compensate, HandlerError, Invoke};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::info;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How a handler call is retried before its failure reaches the engine.
///
/// # Examples
///
/// ```
/// use musubi::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential(5, Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Fail on the first error.
    #[default]
    None,
    /// Same wait before every retry.
    Fixed {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Wait before each retry.
        delay: Duration,
    },
    /// Wait doubles before every retry, up to `max_delay`.
    Exponential {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Wait before the first retry.
        initial_delay: Duration,
        /// Cap on any single wait.
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// Retries `max_retries` times, waiting `delay` each time.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    /// Doubles the wait after every retry, capped at 60 seconds.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::Exponential {
            max_retries,
            initial_delay,
            max_delay: MAX_BACKOFF.max(initial_delay),
        }
    }

    /// Returns the number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. } | RetryPolicy::Exponential { max_retries, .. } => {
                *max_retries
            }
        }
    }

    /// Returns the wait before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::Exponential {
                initial_delay,
                max_delay,
                ..
            } => {
                let delay = initial_delay
                    .checked_mul(2u32.saturating_pow(attempt))
                    .unwrap_or(*max_delay);
                Some(delay.min(*max_delay))
            }
        }
    }

    async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, HandlerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HandlerError>>,
    {
        let max_retries = self.max_retries();
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_retries => {
                    info!(
                        handler = label,
                        error = %error,
                        "retrying ({}/{})",
                        attempt + 1,
                        max_retries
                    );
                    if let Some(delay) = self.delay_for_attempt(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Wraps an [`Invoke`] or [`Compensate`] handler with a [`RetryPolicy`].
///
/// # Examples
///
/// ```
/// use musubi::prelude::*;
/// use std::time::Duration;
/// use serde_json::Value;
///
/// let flaky = invoke_fn(|input: Value| async move { Ok::<_, HandlerError>(input) });
/// let binding = HandlerBinding::new(Retrying::new(flaky, RetryPolicy::fixed(3, Duration::from_millis(10))));
/// # let _ = binding;
/// ```
#[derive(Debug, Clone)]
pub struct Retrying<H> {
    inner: H,
    policy: RetryPolicy,
}

impl<H> Retrying<H> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: H, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<H: Invoke> Invoke for Retrying<H> {
    async fn invoke(&self, input: Value) -> Result<Value, HandlerError> {
        self.policy
            .run("invoke", || self.inner.invoke(input.clone()))
            .await
    }
}

#[async_trait]
impl<H: Compensate> Compensate for Retrying<H> {
    async fn compensate(&self, input: Value) -> Result<(), HandlerError> {
        self.policy
            .run("compensate", || self.inner.compensate(input.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use musubi_core::{compensate_fn, invoke_fn};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky(attempts: Arc<AtomicU32>, fail_until: u32) -> impl Invoke {
        invoke_fn(move |input: Value| {
            let attempts = attempts.clone();
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < fail_until {
                    return Err(HandlerError::new(format!("attempt {} failed", attempt + 1)));
                }
                Ok(input)
            }
        })
    }

    #[tokio::test]
    async fn test_retry_eventual_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let handler = Retrying::new(
            flaky(attempts.clone(), 2),
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        );

        let output = handler.invoke(json!({ "id": 1 })).await;
        assert_eq!(output.expect("succeeded"), json!({ "id": 1 }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let handler = Retrying::new(
            flaky(attempts.clone(), 10),
            RetryPolicy::fixed(3, Duration::from_millis(1)),
        );

        let error = handler.invoke(json!({})).await.expect_err("handler failed");
        assert_eq!(error.message(), "attempt 4 failed");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_no_policy_calls_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let handler = Retrying::new(flaky(attempts.clone(), 1), RetryPolicy::None);

        assert!(handler.invoke(json!({})).await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_compensation() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let handler = Retrying::new(
            compensate_fn(move |_input: Value| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(HandlerError::new("store busy"));
                    }
                    Ok(())
                }
            }),
            RetryPolicy::fixed(1, Duration::from_millis(1)),
        );

        assert!(handler.compensate(json!({})).await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy::Exponential {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(10), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_for_attempt(64), Some(Duration::from_secs(10)));
        assert_eq!(RetryPolicy::None.delay_for_attempt(0), None);
    }

    #[test]
    fn test_exponential_cap_never_below_initial_delay() {
        let policy = RetryPolicy::exponential(2, Duration::from_secs(90));
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(90)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(90)));
        assert_eq!(policy.max_retries(), 2);
    }
}
