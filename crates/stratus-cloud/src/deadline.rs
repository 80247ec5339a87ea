//! Absolute deadlines for retry and wait loops

use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in time after which no further attempts or polls start.
///
/// Once created a deadline cannot be moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        let at = started.checked_add(timeout).unwrap_or_else(far_future);
        Self { started, at }
    }

    /// Deadline at an absolute instant. An instant in the past is allowed.
    pub fn at(at: Instant) -> Self {
        Self {
            started: Instant::now(),
            at,
        }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, zero once elapsed
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Time since the deadline was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// roughly thirty years; large enough to mean "never" without overflowing Instant
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(!deadline.is_elapsed());
        assert_eq!(deadline.remaining(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(deadline.is_elapsed());
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert_eq!(deadline.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_in_the_past() {
        let now = Instant::now();
        tokio::time::advance(Duration::from_secs(1)).await;
        let deadline = Deadline::at(now);
        assert!(deadline.is_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_does_not_overflow() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_elapsed());
    }
}
