//! Retry executor with incremental backoff
//!
//! [`RetryPolicy`] describes the shape of the backoff, [`Waiter`] is a
//! single-use cursor over it, and [`Retry`] runs an operation until it
//! succeeds, fails with a non-transient error, or its deadline passes.
//!
//! Retries are bounded by time, never by count. At least one attempt is
//! always made, even with a deadline already in the past, and no attempt
//! starts once the deadline has been reached.

use crate::classify::ErrorClassifier;
use crate::deadline::Deadline;
use crate::error::{CloudError, OperationError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// How the wait grows after each sleep
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    /// Add a fixed step
    Increment(Duration),
    /// Multiply by a factor (at least 1.0)
    Factor(f64),
}

/// Shortest sleep a [`Waiter`] will take, whatever the policy says
pub const MIN_WAIT: Duration = Duration::from_millis(100);

/// Backoff configuration
///
/// A plain value: clone it per call, never share a [`Waiter`]. Waits
/// never drop below [`MIN_WAIT`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_wait: Duration,
    pub growth: Growth,
    /// Upper bound for a single wait; `None` means bounded only by the deadline
    pub max_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(2),
            growth: Growth::Increment(Duration::from_secs(2)),
            max_wait: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed wait of `initial_wait` between attempts
    pub fn new(initial_wait: Duration) -> Self {
        Self {
            initial_wait,
            growth: Growth::Increment(Duration::ZERO),
            max_wait: None,
        }
    }

    pub fn increment(mut self, step: Duration) -> Self {
        self.growth = Growth::Increment(step);
        self
    }

    pub fn growth_factor(mut self, factor: f64) -> Self {
        // NaN and shrinking factors degrade to a fixed wait
        let factor = if factor.is_nan() { 1.0 } else { factor.max(1.0) };
        self.growth = Growth::Factor(factor);
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Start a fresh waiter at `initial_wait`
    pub fn waiter(&self) -> Waiter {
        Waiter {
            next: self.cap(self.initial_wait),
            policy: self.clone(),
            total: Duration::ZERO,
        }
    }

    fn cap(&self, wait: Duration) -> Duration {
        let wait = match self.max_wait {
            Some(max) => wait.min(max),
            None => wait,
        };
        wait.max(MIN_WAIT)
    }

    fn grow(&self, wait: Duration) -> Duration {
        let grown = match self.growth {
            Growth::Increment(step) => wait.saturating_add(step),
            Growth::Factor(factor) => {
                Duration::try_from_secs_f64(wait.as_secs_f64() * factor).unwrap_or(Duration::MAX)
            }
        };
        self.cap(grown)
    }
}

/// The stateful side of a [`RetryPolicy`]: each call to
/// [`Waiter::wait_until`] sleeps the current duration and advances it
/// toward `max_wait`.
#[derive(Debug)]
pub struct Waiter {
    policy: RetryPolicy,
    next: Duration,
    total: Duration,
}

impl Waiter {
    /// Duration the next call to `wait_until` will sleep
    pub fn next_delay(&self) -> Duration {
        self.next
    }

    /// Total time slept so far
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Sleep the current wait and advance, never past `deadline`
    pub async fn wait_until(&mut self, deadline: &Deadline) -> Duration {
        let start = Instant::now();
        let planned = self.advance();
        let wake = start
            .checked_add(planned)
            .map_or(deadline.instant(), |t| t.min(deadline.instant()));
        sleep_until(wake).await;
        let slept = wake.saturating_duration_since(start);
        self.total = self.total - planned + slept;
        slept
    }

    fn advance(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.policy.grow(delay);
        self.total = self.total.saturating_add(delay);
        delay
    }
}

/// Retry executor
///
/// ```ignore
/// let server = Retry::new(&classifier, Duration::from_secs(600))
///     .operation("server create")
///     .transient_codes(["still_creating"])
///     .run(|| transport.call("server create", &params))
///     .await?;
/// ```
pub struct Retry<'a> {
    classifier: &'a ErrorClassifier,
    deadline: Deadline,
    policy: RetryPolicy,
    extra_transient: Vec<String>,
    operation: String,
}

impl<'a> Retry<'a> {
    /// Retry for at most `timeout` from now with the default policy
    pub fn new(classifier: &'a ErrorClassifier, timeout: Duration) -> Self {
        Self::with_deadline(classifier, Deadline::after(timeout))
    }

    pub fn with_deadline(classifier: &'a ErrorClassifier, deadline: Deadline) -> Self {
        Self {
            classifier,
            deadline,
            policy: RetryPolicy::default(),
            extra_transient: Vec::new(),
            operation: "operation".to_string(),
        }
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Codes that are transient only for this call site
    pub fn transient_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_transient.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Label used in logs and in the deadline error
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = name.into();
        self
    }

    /// Run `op` until it succeeds, fails permanently, or the deadline passes.
    pub async fn run<T, F, Fut>(self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationError>>,
    {
        let mut waiter = self.policy.waiter();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => {
                    tracing::debug!(
                        operation = %self.operation,
                        attempt,
                        elapsed = ?self.deadline.elapsed(),
                        "attempt succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = self.classifier.classify_with(&err, &self.extra_transient);
            tracing::debug!(
                operation = %self.operation,
                attempt,
                %kind,
                code = err.root_code().unwrap_or("-"),
                error = %err,
                "attempt failed"
            );

            if !kind.is_retryable() {
                return Err(CloudError::Operation(err));
            }

            if !self.deadline.is_elapsed() {
                let slept = waiter.wait_until(&self.deadline).await;
                tracing::debug!(operation = %self.operation, attempt, ?slept, "backed off");
            }

            if self.deadline.is_elapsed() {
                tracing::warn!(
                    operation = %self.operation,
                    attempts = attempt,
                    elapsed = ?self.deadline.elapsed(),
                    "retry deadline exceeded"
                );
                return Err(CloudError::DeadlineExceeded {
                    operation: self.operation,
                    attempts: attempt,
                    elapsed: self.deadline.elapsed(),
                    last_error: err,
                });
            }
        }
    }
}

/// Run `op` with the default policy for at most `timeout`
pub async fn retry<T, F, Fut>(classifier: &ErrorClassifier, timeout: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, OperationError>>,
{
    Retry::new(classifier, timeout).run(op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::Cell;

    fn throttled() -> OperationError {
        OperationError::unclassified("request was throttled").with_code("Throttling")
    }

    #[test]
    fn test_incremental_waits() {
        let policy = RetryPolicy::new(Duration::from_secs(3)).increment(Duration::from_secs(3));
        let mut waiter = policy.waiter();
        let delays: Vec<u64> = (0..4).map(|_| waiter.advance().as_secs()).collect();
        assert_eq!(delays, vec![3, 6, 9, 12]);
        assert_eq!(waiter.total(), Duration::from_secs(30));
    }

    #[test]
    fn test_factor_waits_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1))
            .growth_factor(2.0)
            .max_wait(Duration::from_secs(10));
        let mut waiter = policy.waiter();
        let delays: Vec<u64> = (0..6).map(|_| waiter.advance().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_shrinking_factor_is_fixed() {
        let policy = RetryPolicy::new(Duration::from_secs(5)).growth_factor(0.5);
        let mut waiter = policy.waiter();
        waiter.advance();
        assert_eq!(waiter.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_wait_is_floored() {
        let policy = RetryPolicy::new(Duration::ZERO).increment(Duration::ZERO);
        let mut waiter = policy.waiter();
        assert_eq!(waiter.advance(), MIN_WAIT);
        assert_eq!(waiter.advance(), MIN_WAIT);

        let capped = RetryPolicy::new(Duration::from_secs(1)).max_wait(Duration::ZERO);
        assert_eq!(capped.waiter().next_delay(), MIN_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_wait_policy_does_not_spin() {
        let classifier = ErrorClassifier::default();
        let attempts = Cell::new(0u32);
        let err = Retry::new(&classifier, Duration::from_secs(1))
            .policy(RetryPolicy::new(Duration::ZERO).increment(Duration::ZERO))
            .run(|| {
                attempts.set(attempts.get() + 1);
                async { Err::<(), _>(throttled()) }
            })
            .await
            .unwrap_err();

        assert!(err.is_deadline_exceeded());
        assert!((9..=11).contains(&attempts.get()), "attempts: {}", attempts.get());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_consumes_no_wait() {
        let classifier = ErrorClassifier::default();
        let start = Instant::now();
        let value = retry(&classifier, Duration::from_secs(30), || async { Ok::<_, OperationError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let classifier = ErrorClassifier::default();
        let calls = Cell::new(0);
        let result: Result<()> = retry(&classifier, Duration::from_secs(30), || {
            calls.set(calls.get() + 1);
            async { Err(OperationError::unclassified("invalid plan").with_code("InvalidParameter")) }
        })
        .await;

        assert_eq!(calls.get(), 1);
        let err = result.unwrap_err();
        assert!(!err.is_deadline_exceeded());
        assert_eq!(err.as_operation().unwrap().provider_code(), Some("InvalidParameter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_n_times_then_success() {
        let classifier = ErrorClassifier::default();
        let calls = Cell::new(0u32);
        let n = 3;
        let value = retry(&classifier, Duration::from_secs(60), || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt <= n {
                    Err(throttled())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, n + 1);
        assert_eq!(calls.get(), n + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_in_the_past_still_attempts_once() {
        let classifier = ErrorClassifier::default();
        let calls = Cell::new(0);
        let past = Deadline::at(Instant::now());
        tokio::time::advance(Duration::from_secs(1)).await;

        let result: Result<()> = Retry::with_deadline(&classifier, past)
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err(throttled()) }
            })
            .await;

        assert_eq!(calls.get(), 1);
        assert!(result.unwrap_err().is_deadline_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_until_deadline() {
        let classifier = ErrorClassifier::default();
        let calls = Cell::new(0u32);
        let start = Instant::now();

        let result: Result<()> = Retry::new(&classifier, Duration::from_secs(30))
            .policy(RetryPolicy::new(Duration::from_secs(3)).increment(Duration::from_secs(3)))
            .operation("instance create")
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err(throttled()) }
            })
            .await;

        let elapsed = start.elapsed();
        assert!(calls.get() >= 3);
        assert!(elapsed >= Duration::from_secs(9));
        assert!(elapsed <= Duration::from_secs(30));

        match result.unwrap_err() {
            CloudError::DeadlineExceeded {
                operation,
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(operation, "instance create");
                assert_eq!(attempts, calls.get());
                assert_eq!(last_error.provider_code(), Some("Throttling"));
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_transient_codes() {
        let classifier = ErrorClassifier::default();
        let calls = Cell::new(0u32);

        let value = Retry::new(&classifier, Duration::from_secs(60))
            .transient_codes(["DiskAttaching"])
            .run(|| {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt == 1 {
                        Err(OperationError::unclassified("disk attaching").with_code("DiskAttaching"))
                    } else {
                        Ok("attached")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "attached");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_propagates_immediately() {
        let classifier = ErrorClassifier::default();
        let result: Result<()> = retry(&classifier, Duration::from_secs(60), || async {
            Err(OperationError::unclassified("gone").with_status(404))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(classifier.classify_error(&err), ErrorKind::NotFound);
    }
}
