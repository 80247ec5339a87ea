//! Resource provider trait definition

use crate::classify::ErrorClassifier;
use crate::error::Result;
use async_trait::async_trait;
use std::error::Error as StdError;
use std::time::Duration;

/// Lifecycle entry points for one resource type
///
/// Every provider (Sakura Cloud servers, Cloudflare DNS records, ...)
/// implements this so the host can drive create/read/update/delete the same
/// way. Each call builds its own retry and poll state; nothing is shared
/// between concurrent calls except the provider's transport.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Desired configuration of the resource
    type Spec: Send + Sync;

    /// Observed state of the resource
    type Snapshot: Send;

    /// Provider name (e.g. "sakura-cloud", "cloudflare")
    fn name(&self) -> &str;

    /// Resource type (e.g. "server", "dns-record")
    fn resource_type(&self) -> &str;

    /// Create the resource and wait until it is usable
    async fn create(&self, spec: &Self::Spec) -> Result<Self::Snapshot>;

    /// Read the resource; `None` when it does not exist
    async fn read(&self, id: &str) -> Result<Option<Self::Snapshot>>;

    /// Converge an existing resource towards `spec`
    async fn update(&self, id: &str, spec: &Self::Spec) -> Result<Self::Snapshot>;

    /// Delete the resource and wait until it is gone. Deleting a missing
    /// resource succeeds.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Per-operation deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(20 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(20 * 60),
            delete: Duration::from_secs(20 * 60),
        }
    }
}

/// Turn NotFound into success, for idempotent deletes
pub fn ignore_not_found<T, E>(
    classifier: &ErrorClassifier,
    result: std::result::Result<T, E>,
) -> std::result::Result<Option<T>, E>
where
    E: StdError + 'static,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if classifier.is_not_found(&err) => {
            tracing::debug!(error = %err, "ignoring not found");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CloudError, OperationError};

    #[test]
    fn test_default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.create, Duration::from_secs(1200));
        assert_eq!(t.read, Duration::from_secs(300));
    }

    #[test]
    fn test_ignore_not_found() {
        let classifier = ErrorClassifier::default();

        let missing: Result<()> =
            Err(OperationError::unclassified("no such record").with_status(404).into());
        assert!(ignore_not_found(&classifier, missing).unwrap().is_none());

        let present: Result<u32> = Ok(3);
        assert_eq!(ignore_not_found(&classifier, present).unwrap(), Some(3));

        let failed: Result<()> = Err(CloudError::InvalidConfig("bad".to_string()));
        assert!(ignore_not_found(&classifier, failed).is_err());
    }
}
