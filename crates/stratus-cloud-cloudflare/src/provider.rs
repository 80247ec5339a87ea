//! Cloudflare DNS record resource

use crate::dns::{CloudflareApi, DnsConfig, DnsRecordInfo, DnsRecordSpec};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use stratus_cloud::{
    ClassifierConfig, Deadline, ErrorClassifier, OperationError, PollTarget, ResourceProvider,
    Retry, RetryPolicy, StatePoller, Timeouts, Transport, decode, ignore_not_found,
};

/// 81044: record does not exist
const NOT_FOUND_CODES: &[&str] = &["81044"];
/// 7003: "could not route", returned for identifiers that no longer exist
const FORBIDDEN_NOT_FOUND_CODES: &[&str] = &["7003"];
/// 81053, 81057, 81058: a record with that name (and content) already exists
const ALREADY_EXISTS_CODES: &[&str] = &["81053", "81057", "81058"];
/// 971: "Please wait and consider throttling your request speed"
const TRANSIENT_CODES: &[&str] = &["971"];

/// Classifier vocabulary for the Cloudflare API on top of the defaults
pub fn classifier_config() -> ClassifierConfig {
    ClassifierConfig::default().merge(
        &ClassifierConfig::empty()
            .not_found_codes(NOT_FOUND_CODES.iter().copied())
            .forbidden_not_found_codes(FORBIDDEN_NOT_FOUND_CODES.iter().copied())
            .already_exists_substrings(ALREADY_EXISTS_CODES.iter().copied())
            .transient_codes(TRANSIENT_CODES.iter().copied()),
    )
}

pub fn classifier() -> ErrorClassifier {
    ErrorClassifier::new(classifier_config())
}

/// Cloudflare DNS record provider
pub struct CloudflareDns<T = CloudflareApi> {
    transport: T,
    config: DnsConfig,
    classifier: ErrorClassifier,
    timeouts: Timeouts,
    retry_policy: RetryPolicy,
    poll_interval: (Duration, Duration),
}

impl CloudflareDns<CloudflareApi> {
    /// Create a DNS provider talking to the Cloudflare API
    pub fn new(config: DnsConfig) -> crate::Result<Self> {
        let api = CloudflareApi::new(config.api_token.clone())?;
        Ok(Self::with_transport(api, config))
    }
}

impl<T: Transport> CloudflareDns<T> {
    pub fn with_transport(transport: T, config: DnsConfig) -> Self {
        Self {
            transport,
            config,
            classifier: classifier(),
            timeouts: Timeouts::default(),
            retry_policy: RetryPolicy::default(),
            poll_interval: (Duration::from_secs(2), Duration::from_secs(10)),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_interval = (initial, max);
        self
    }

    /// Get the domain
    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    fn records_path(&self) -> String {
        format!("zones/{}/dns_records", self.config.zone_id)
    }

    fn record_path(&self, id: &str) -> String {
        format!("zones/{}/dns_records/{}", self.config.zone_id, id)
    }

    fn retry(&self, deadline: Deadline, operation: &str) -> Retry<'_> {
        Retry::with_deadline(&self.classifier, deadline)
            .policy(self.retry_policy.clone())
            .operation(operation)
    }

    async fn read_record(&self, id: &str) -> Result<DnsRecordInfo, OperationError> {
        let action = format!("GET {}", self.record_path(id));
        let value = self.transport.call(&action, &Value::Null).await?;
        decode(&action, value)
    }

    /// Find a DNS record by name and type
    pub async fn find_record(
        &self,
        name: &str,
        record_type: &str,
    ) -> stratus_cloud::Result<Option<DnsRecordInfo>> {
        let action = format!("GET {}", self.records_path());
        let params = json!({ "type": record_type, "name": self.config.full_domain(name) });
        let deadline = Deadline::after(self.timeouts.read);

        let value = self
            .retry(deadline, "dns list")
            .run(|| self.transport.call(&action, &params))
            .await?;
        let records: Vec<DnsRecordInfo> = match value {
            Value::Null => Vec::new(),
            other => decode(&action, other)?,
        };
        Ok(records.into_iter().next())
    }

    async fn patch_record(
        &self,
        id: &str,
        spec: &DnsRecordSpec,
        deadline: Deadline,
    ) -> stratus_cloud::Result<()> {
        let action = format!("PATCH {}", self.record_path(id));
        let params = json!({ "content": spec.content, "ttl": spec.ttl, "proxied": spec.proxied });
        self.retry(deadline, "dns update")
            .run(|| self.transport.call(&action, &params))
            .await?;
        Ok(())
    }

    /// Wait until reads report the requested content
    async fn wait_content(
        &self,
        id: &str,
        spec: &DnsRecordSpec,
        deadline: Deadline,
    ) -> stratus_cloud::Result<DnsRecordInfo> {
        let target = PollTarget::<String>::new(id, deadline.remaining())
            .label("dns record")
            .targets([spec.content.clone()])
            .allow_missing()
            .interval(self.poll_interval.0, self.poll_interval.1);
        let outcome = StatePoller::new(&self.classifier)
            .wait(&target, || self.read_record(id), |r| r.content.clone())
            .await?;
        outcome.into_snapshot().ok_or_else(|| {
            OperationError::fatal(format!("dns record {} vanished while waiting", id)).into()
        })
    }

    /// Create or update the record named in `spec`, then wait for its content
    pub async fn ensure(&self, spec: &DnsRecordSpec) -> stratus_cloud::Result<DnsRecordInfo> {
        match self.find_record(&spec.name, &spec.record_type).await? {
            Some(existing) if existing.content == spec.content && existing.proxied == spec.proxied => {
                tracing::debug!("DNS record already exists with correct content: {}", existing.name);
                Ok(existing)
            }
            Some(existing) => {
                tracing::info!(
                    "Updating DNS record {} from {} to {}",
                    existing.name,
                    existing.content,
                    spec.content
                );
                self.update(&existing.id, spec).await
            }
            None => self.create(spec).await,
        }
    }

    /// Remove the record with this name if it exists
    pub async fn remove(&self, name: &str, record_type: &str) -> stratus_cloud::Result<()> {
        match self.find_record(name, record_type).await? {
            Some(record) => {
                tracing::info!("Deleting DNS record: {}", record.name);
                self.delete(&record.id).await
            }
            None => {
                tracing::debug!("DNS record not found, nothing to delete: {}", name);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<T: Transport> ResourceProvider for CloudflareDns<T> {
    type Spec = DnsRecordSpec;
    type Snapshot = DnsRecordInfo;

    fn name(&self) -> &str {
        "cloudflare"
    }

    fn resource_type(&self) -> &str {
        "dns-record"
    }

    async fn create(&self, spec: &DnsRecordSpec) -> stratus_cloud::Result<DnsRecordInfo> {
        let deadline = Deadline::after(self.timeouts.create);
        let action = format!("POST {}", self.records_path());
        let params = json!(spec);

        tracing::info!("Creating DNS record: {} -> {}", self.config.full_domain(&spec.name), spec.content);
        let created = self
            .retry(deadline, "dns create")
            .run(|| self.transport.call(&action, &params))
            .await;

        let id = match created {
            Ok(value) => decode::<DnsRecordInfo>(&action, value)?.id,
            Err(err) if self.classifier.is_already_exists(&err) => {
                let Some(existing) = self.find_record(&spec.name, &spec.record_type).await? else {
                    return Err(err);
                };
                tracing::info!("DNS record {} already exists, updating it", existing.name);
                if existing.content != spec.content || existing.proxied != spec.proxied {
                    self.patch_record(&existing.id, spec, deadline).await?;
                }
                existing.id
            }
            Err(err) => return Err(err),
        };

        self.wait_content(&id, spec, deadline).await
    }

    async fn read(&self, id: &str) -> stratus_cloud::Result<Option<DnsRecordInfo>> {
        let deadline = Deadline::after(self.timeouts.read);
        let result = self.retry(deadline, "dns read").run(|| self.read_record(id)).await;
        ignore_not_found(&self.classifier, result)
    }

    async fn update(&self, id: &str, spec: &DnsRecordSpec) -> stratus_cloud::Result<DnsRecordInfo> {
        let deadline = Deadline::after(self.timeouts.update);
        self.patch_record(id, spec, deadline).await?;
        self.wait_content(id, spec, deadline).await
    }

    async fn delete(&self, id: &str) -> stratus_cloud::Result<()> {
        let deadline = Deadline::after(self.timeouts.delete);
        let action = format!("DELETE {}", self.record_path(id));

        let deleted = self
            .retry(deadline, "dns delete")
            .run(|| self.transport.call(&action, &Value::Null))
            .await;
        if ignore_not_found(&self.classifier, deleted)?.is_none() {
            tracing::debug!("DNS record {} already gone", id);
        }

        let target = PollTarget::<String>::new(id, deadline.remaining())
            .label("dns record delete")
            .until_absent()
            .interval(self.poll_interval.0, self.poll_interval.1);
        StatePoller::new(&self.classifier)
            .wait(&target, || self.read_record(id), |r| r.content.clone())
            .await?;
        Ok(())
    }
}
