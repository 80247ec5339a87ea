use crate::context;
use colored::Colorize;
use stratus_cloud::{ErrorKind, OperationError};
use stratus_config::Settings;

pub fn handle(
    settings: &Settings,
    code: Option<String>,
    status: Option<u16>,
    message: String,
    provider: Option<&str>,
) -> anyhow::Result<()> {
    let classifier = context::classifier(settings, provider)?;

    let mut err = OperationError::unclassified(message);
    if let Some(code) = code {
        err = err.with_code(code);
    }
    if let Some(status) = status {
        err = err.with_status(status);
    }

    let kind = classifier.classify(&err);
    let label = kind.to_string();
    let label = match kind {
        ErrorKind::Transient => label.yellow(),
        ErrorKind::NotFound | ErrorKind::AlreadyExists => label.cyan(),
        ErrorKind::Fatal | ErrorKind::Unclassified => label.red(),
    };

    println!("{}", label.bold());
    let action = if kind.is_retryable() {
        "retried until the deadline"
    } else {
        "returned immediately"
    };
    println!("{}", format!("errors like this are {}", action).dimmed());
    Ok(())
}
