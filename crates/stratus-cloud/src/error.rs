//! Cloud operation error types
//!
//! Every failure that leaves a transport is expressed as an [`OperationError`]:
//! a node carrying the raw provider code, HTTP status and message, plus an
//! optional cause. Wrapping never mutates a node; it creates a new one that
//! owns the previous, so a chain is always a singly-linked list.
//!
//! [`CloudError`] is what the retry and polling layers hand back to callers.
//! It adds the two wait-specific outcomes (deadline exhaustion and fail-state
//! observation) on top of plain operation failures.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used as the cause of an [`OperationError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Classification of an operation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Expected to resolve itself if retried after a delay
    Transient,
    /// The resource does not exist (or is indistinguishable from absent)
    NotFound,
    /// The resource already exists
    AlreadyExists,
    /// Permanent failure
    Fatal,
    /// No rule matched; treated as fatal by the retry executor
    Unclassified,
}

impl ErrorKind {
    /// Whether the retry executor should attempt the operation again
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::AlreadyExists => write!(f, "already_exists"),
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// A single failure observed while talking to a cloud API
#[derive(Debug)]
pub struct OperationError {
    kind: ErrorKind,
    provider_code: Option<String>,
    http_status: Option<u16>,
    message: String,
    origin: Option<String>,
    cause: Option<BoxError>,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider_code: None,
            http_status: None,
            message: message.into(),
            origin: None,
            cause: None,
        }
    }

    /// An error whose kind is left to the classifier
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Wrap `cause` in a new unclassified node.
    ///
    /// The classifier looks through unclassified wrappers, so adding context
    /// never changes how the chain is classified.
    pub fn wrap(cause: impl Into<BoxError>, message: impl Into<String>) -> Self {
        Self::unclassified(message).with_source(cause)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Kind set where the error was created. `Unclassified` unless the
    /// creating boundary knew better.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn provider_code(&self) -> Option<&str> {
        self.provider_code.as_deref()
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Iterate over the `OperationError` nodes of this chain, outermost first.
    ///
    /// Stops at the first cause that is not an `OperationError`.
    pub fn chain(&self) -> impl Iterator<Item = &OperationError> {
        std::iter::successors(Some(self), |node| {
            node.cause
                .as_deref()
                .and_then(|cause| cause.downcast_ref::<OperationError>())
        })
    }

    /// The innermost provider code in the chain, if any
    pub fn root_code(&self) -> Option<&str> {
        self.chain().filter_map(|node| node.provider_code()).last()
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "{}: ", origin)?;
        }
        write!(f, "{}", self.message)?;
        match (&self.provider_code, self.http_status) {
            (Some(code), Some(status)) => write!(f, " (code: {}, status: {})", code, status),
            (Some(code), None) => write!(f, " (code: {})", code),
            (None, Some(status)) => write!(f, " (status: {})", status),
            (None, None) => Ok(()),
        }
    }
}

impl StdError for OperationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// Errors returned by the resilient-operation layer
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("{operation}: deadline exceeded after {attempts} attempt(s) in {elapsed:?}")]
    DeadlineExceeded {
        operation: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        last_error: OperationError,
    },

    #[error(
        "{resource_id}: timed out after {elapsed:?} waiting for {} (last observed: {})",
        describe_targets(.expected),
        .last_observed.as_deref().unwrap_or("nothing")
    )]
    WaitTimeout {
        resource_id: String,
        elapsed: Duration,
        polls: u32,
        last_observed: Option<String>,
        expected: Vec<String>,
    },

    #[error(
        "{resource_id}: target not reachable, fail state '{state}' observed while waiting for {}",
        describe_targets(.expected)
    )]
    FailStateReached {
        resource_id: String,
        state: String,
        expected: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CloudError {
    /// The wrapped operation error, if this is a plain operation failure
    pub fn as_operation(&self) -> Option<&OperationError> {
        match self {
            CloudError::Operation(err) => Some(err),
            _ => None,
        }
    }

    /// Deadline exhaustion of either the retry executor or the state poller
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(
            self,
            CloudError::DeadlineExceeded { .. } | CloudError::WaitTimeout { .. }
        )
    }

    pub fn is_fail_state(&self) -> bool {
        matches!(self, CloudError::FailStateReached { .. })
    }
}

fn describe_targets(expected: &[String]) -> String {
    if expected.is_empty() {
        "any state".to_string()
    } else {
        expected.join(" | ")
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code_and_status() {
        let err = OperationError::unclassified("rate limited")
            .with_code("Throttling")
            .with_status(429)
            .with_origin("ecs");

        assert_eq!(
            err.to_string(),
            "ecs: rate limited (code: Throttling, status: 429)"
        );
    }

    #[test]
    fn test_wrap_builds_chain() {
        let inner = OperationError::unclassified("no such server").with_code("not_found");
        let middle = OperationError::wrap(inner, "reading server 1234");
        let outer = OperationError::wrap(middle, "deleting server web-01");

        let messages: Vec<&str> = outer.chain().map(|e| e.message()).collect();
        assert_eq!(
            messages,
            vec!["deleting server web-01", "reading server 1234", "no such server"]
        );
        assert_eq!(outer.root_code(), Some("not_found"));
        assert!(outer.source().is_some());
    }

    #[test]
    fn test_chain_stops_at_foreign_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = OperationError::wrap(io, "calling api");

        assert_eq!(err.chain().count(), 1);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("reset by peer"));
    }

    #[test]
    fn test_deadline_exceeded_keeps_last_error() {
        let err = CloudError::DeadlineExceeded {
            operation: "server create".to_string(),
            attempts: 4,
            elapsed: Duration::from_secs(30),
            last_error: OperationError::unclassified("slow down").with_code("Throttling"),
        };

        assert!(err.is_deadline_exceeded());
        assert!(err.to_string().contains("4 attempt(s)"));
        let source = err.source().unwrap().downcast_ref::<OperationError>().unwrap();
        assert_eq!(source.provider_code(), Some("Throttling"));
    }

    #[test]
    fn test_wait_timeout_message() {
        let err = CloudError::WaitTimeout {
            resource_id: "srv-1".to_string(),
            elapsed: Duration::from_secs(60),
            polls: 12,
            last_observed: Some("migrating".to_string()),
            expected: vec!["up".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("srv-1"));
        assert!(msg.contains("last observed: migrating"));
        assert!(msg.contains("up"));

        let any = CloudError::WaitTimeout {
            resource_id: "srv-1".to_string(),
            elapsed: Duration::from_secs(1),
            polls: 1,
            last_observed: None,
            expected: vec![],
        };
        assert!(any.to_string().contains("any state"));
        assert!(any.to_string().contains("nothing"));
    }

    #[test]
    fn test_fail_state_message_names_state() {
        let err = CloudError::FailStateReached {
            resource_id: "disk-9".to_string(),
            state: "failed".to_string(),
            expected: vec!["available".to_string()],
        };
        assert!(err.is_fail_state());
        assert!(err.to_string().contains("'failed'"));
    }
}
