//! Transport abstraction
//!
//! A transport sends one request to a provider API and returns the decoded
//! response. It is the only place where SDK-, CLI- or HTTP-specific failure
//! shapes are seen: implementations must turn every failure, including a
//! successful response whose body reports an error, into an
//! [`OperationError`] before returning.

use crate::error::{ErrorKind, OperationError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Request/response client for a provider API
///
/// `action` names the remote operation (e.g. `"server read"` or
/// `"GET zones/{id}/dns_records"`); `params` carries its arguments.
/// Implementations must be safe to share between concurrent operations.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, action: &str, params: &Value) -> Result<Value, OperationError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn call(&self, action: &str, params: &Value) -> Result<Value, OperationError> {
        (**self).call(action, params).await
    }
}

/// Decode a transport response into a typed snapshot.
///
/// A response that does not match the expected shape is fatal: retrying
/// the same request will not change it.
pub fn decode<T: DeserializeOwned>(action: &str, value: Value) -> Result<T, OperationError> {
    serde_json::from_value(value).map_err(|e| {
        OperationError::new(ErrorKind::Fatal, format!("unexpected response to '{}'", action))
            .with_source(e)
    })
}
