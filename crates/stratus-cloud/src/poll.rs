//! Waiting for asynchronous resources to reach a state
//!
//! Control-plane operations usually return before the resource is usable.
//! [`StatePoller`] repeatedly reads the resource, extracts a comparable value
//! with an accessor, and resolves exactly once:
//!
//! - success when the value is one of the targets (or, with no targets, on
//!   any non-fail value),
//! - [`CloudError::FailStateReached`] on the first fail-state value,
//! - success with no snapshot when waiting for absence and the read reports
//!   NotFound,
//! - [`CloudError::WaitTimeout`] once the deadline passes.
//!
//! Transient read failures do not end the wait; they count as "no
//! observation" for that poll.

use crate::classify::ErrorClassifier;
use crate::deadline::Deadline;
use crate::error::{CloudError, ErrorKind, OperationError, Result};
use crate::retry::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// A single pending wait: what to read, what to expect, how long to wait
#[derive(Debug, Clone)]
pub struct PollTarget<V> {
    resource_id: String,
    label: String,
    targets: Vec<V>,
    fail_states: Vec<V>,
    until_absent: bool,
    allow_missing: bool,
    timeout: Duration,
    policy: RetryPolicy,
}

impl<V> PollTarget<V>
where
    V: PartialEq + Display,
{
    pub fn new(resource_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            resource_id: resource_id.into(),
            label: "resource".to_string(),
            targets: Vec::new(),
            fail_states: Vec::new(),
            until_absent: false,
            allow_missing: false,
            timeout,
            policy: RetryPolicy::new(Duration::from_secs(2))
                .increment(Duration::from_secs(1))
                .max_wait(Duration::from_secs(10)),
        }
    }

    pub fn targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<V>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn fail_states<I, T>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<V>,
    {
        self.fail_states.extend(states.into_iter().map(Into::into));
        self
    }

    /// Succeed when the read reports NotFound
    pub fn until_absent(mut self) -> Self {
        self.until_absent = true;
        self
    }

    /// Keep polling on NotFound instead of failing. Useful right after a
    /// create, before the new resource is visible to reads.
    pub fn allow_missing(mut self) -> Self {
        self.allow_missing = true;
        self
    }

    /// Sleep between polls, growing linearly from `initial` to `max`
    pub fn interval(mut self, initial: Duration, max: Duration) -> Self {
        let step = if max > initial { Duration::from_secs(1).min(max - initial) } else { Duration::ZERO };
        self.policy = RetryPolicy::new(initial).increment(step).max_wait(max.max(initial));
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Human-readable name used in logs, e.g. "server power-on"
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn expected(&self) -> Vec<String> {
        if self.until_absent {
            let mut expected: Vec<String> = self.targets.iter().map(ToString::to_string).collect();
            expected.push("absent".to_string());
            expected
        } else {
            self.targets.iter().map(ToString::to_string).collect()
        }
    }

    fn is_target(&self, value: &V) -> bool {
        if self.targets.is_empty() {
            // "merely exists" waits; an absence wait needs the resource gone
            !self.until_absent
        } else {
            self.targets.contains(value)
        }
    }
}

/// How a successful wait ended
#[derive(Debug)]
pub struct WaitOutcome<S> {
    /// The snapshot that satisfied the target; `None` when the resource is absent
    pub snapshot: Option<S>,
    /// The value extracted from `snapshot`
    pub observed: Option<String>,
    pub polls: u32,
    pub elapsed: Duration,
}

impl<S> WaitOutcome<S> {
    pub fn into_snapshot(self) -> Option<S> {
        self.snapshot
    }
}

/// Runs [`PollTarget`]s
#[derive(Debug, Clone, Copy)]
pub struct StatePoller<'a> {
    classifier: &'a ErrorClassifier,
}

impl<'a> StatePoller<'a> {
    pub fn new(classifier: &'a ErrorClassifier) -> Self {
        Self { classifier }
    }

    /// Poll `probe` until `target` resolves.
    ///
    /// `probe` performs one read; `accessor` extracts the comparable value
    /// from its snapshot.
    pub async fn wait<S, V, P, Fut, A>(
        &self,
        target: &PollTarget<V>,
        mut probe: P,
        accessor: A,
    ) -> Result<WaitOutcome<S>>
    where
        V: PartialEq + Display,
        P: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<S, OperationError>>,
        A: Fn(&S) -> V,
    {
        let deadline = Deadline::after(target.timeout);
        let mut waiter = target.policy.waiter();
        let mut polls: u32 = 0;
        let mut last_observed: Option<String> = None;

        loop {
            polls += 1;
            match probe().await {
                Ok(snapshot) => {
                    let value = accessor(&snapshot);
                    let observed = value.to_string();
                    tracing::debug!(
                        resource_id = %target.resource_id,
                        label = %target.label,
                        poll = polls,
                        observed = %observed,
                        "polled"
                    );

                    if target.fail_states.contains(&value) {
                        tracing::warn!(
                            resource_id = %target.resource_id,
                            label = %target.label,
                            state = %observed,
                            "fail state reached"
                        );
                        return Err(CloudError::FailStateReached {
                            resource_id: target.resource_id.clone(),
                            state: observed,
                            expected: target.expected(),
                        });
                    }

                    if target.is_target(&value) {
                        return Ok(WaitOutcome {
                            snapshot: Some(snapshot),
                            observed: Some(observed),
                            polls,
                            elapsed: deadline.elapsed(),
                        });
                    }

                    last_observed = Some(observed);
                }
                Err(err) => match self.classifier.classify(&err) {
                    ErrorKind::NotFound if target.until_absent => {
                        tracing::debug!(
                            resource_id = %target.resource_id,
                            label = %target.label,
                            poll = polls,
                            "resource is absent"
                        );
                        return Ok(WaitOutcome {
                            snapshot: None,
                            observed: None,
                            polls,
                            elapsed: deadline.elapsed(),
                        });
                    }
                    ErrorKind::NotFound if target.allow_missing => {
                        tracing::debug!(
                            resource_id = %target.resource_id,
                            poll = polls,
                            "resource not visible yet"
                        );
                        last_observed = Some("absent".to_string());
                    }
                    ErrorKind::Transient => {
                        tracing::debug!(
                            resource_id = %target.resource_id,
                            poll = polls,
                            error = %err,
                            "transient read failure while polling"
                        );
                    }
                    _ => {
                        let context = format!(
                            "reading {} {} while waiting for {}",
                            target.label,
                            target.resource_id,
                            target.expected().join(" | ")
                        );
                        return Err(OperationError::wrap(err, context).into());
                    }
                },
            }

            if !deadline.is_elapsed() {
                waiter.wait_until(&deadline).await;
            }

            if deadline.is_elapsed() {
                tracing::warn!(
                    resource_id = %target.resource_id,
                    label = %target.label,
                    polls,
                    last_observed = last_observed.as_deref().unwrap_or("-"),
                    "wait timed out"
                );
                return Err(CloudError::WaitTimeout {
                    resource_id: target.resource_id.clone(),
                    elapsed: deadline.elapsed(),
                    polls,
                    last_observed,
                    expected: target.expected(),
                });
            }
        }
    }
}
