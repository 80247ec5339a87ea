//! Sakura Cloud provider error types

use regex::Regex;
use std::sync::LazyLock;
use stratus_cloud::{ErrorKind, OperationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SakuraError {
    #[error("usacloud not found. Please install: brew install usacloud")]
    UsacloudNotFound,

    #[error("usacloud command failed (exit code {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("Invalid plan: {0} (expected e.g. \"2core-4gb\")")]
    InvalidPlan(String),

    #[error("Invalid parameters for '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SakuraError>;

// Sakura Cloud API errors appear either as the raw JSON body
// ({"status":"404 Not Found","error_code":"not_found","error_msg":"..."})
// or as the Go struct dump usacloud prints (Status:"404 Not Found", ErrorCode:"not_found").
static ERROR_CODE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?:"error_code"\s*:\s*"|ErrorCode:\s*")([^"]+)""#).ok()
});
static STATUS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?:"status"\s*:\s*"|Status:\s*")(\d{3})"#).ok()
});
static ERROR_MSG: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?:"error_msg"\s*:\s*"|ErrorMessage:\s*")([^"]*)""#).ok()
});

/// Extract code, status and message from usacloud's stderr
pub fn parse_error_output(stderr: &str) -> OperationError {
    let capture = |re: &Option<Regex>| {
        re.as_ref()
            .and_then(|re| re.captures(stderr))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let message = capture(&ERROR_MSG)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| stderr.trim().to_string());
    let mut err = OperationError::unclassified(message).with_origin("usacloud");

    if let Some(code) = capture(&ERROR_CODE) {
        err = err.with_code(code);
    }
    if let Some(status) = capture(&STATUS).and_then(|s| s.parse::<u16>().ok()) {
        err = err.with_status(status);
    }
    err
}

impl From<SakuraError> for OperationError {
    fn from(err: SakuraError) -> Self {
        match err {
            SakuraError::CommandFailed { ref stderr, .. } => {
                let parsed = parse_error_output(stderr);
                tracing::debug!(error = %parsed, "usacloud reported an error");
                parsed
            }
            SakuraError::IoError(e) => {
                OperationError::wrap(e, "failed to run usacloud").with_origin("usacloud")
            }
            other => OperationError::new(ErrorKind::Fatal, other.to_string()).with_origin("usacloud"),
        }
    }
}
