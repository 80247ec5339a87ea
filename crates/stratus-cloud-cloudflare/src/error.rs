//! Cloudflare provider error types

use stratus_cloud::{ErrorKind, OperationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid action '{0}' (expected \"METHOD path\")")]
    InvalidAction(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudflareError>;

impl From<CloudflareError> for OperationError {
    fn from(err: CloudflareError) -> Self {
        OperationError::new(ErrorKind::Fatal, err.to_string()).with_origin("cloudflare")
    }
}

/// Failures below the HTTP layer: no response was received at all
pub(crate) fn request_error(action: &str, err: reqwest::Error) -> OperationError {
    let message = format!("{} failed", action);
    let mut op = if err.is_timeout() || err.is_connect() {
        OperationError::transient(message)
    } else {
        OperationError::unclassified(message)
    };
    if let Some(status) = err.status() {
        op = op.with_status(status.as_u16());
    }
    op.with_origin("cloudflare").with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        let err = OperationError::from(CloudflareError::MissingEnvVar("CLOUDFLARE_ZONE_ID".into()));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.message().contains("CLOUDFLARE_ZONE_ID"));
    }
}
