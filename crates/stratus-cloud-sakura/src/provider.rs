//! Sakura Cloud server resource

use crate::error::SakuraError;
use crate::usacloud::{ServerInfo, Usacloud};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use stratus_cloud::{
    ClassifierConfig, CloudError, Deadline, ErrorClassifier, OperationError, PollTarget,
    ResourceProvider, Retry, RetryPolicy, StatePoller, Timeouts, decode, ignore_not_found,
};

/// Codes the Sakura Cloud API uses for absence and for "try again later"
const NOT_FOUND_CODES: &[&str] = &["not_found"];
const TRANSIENT_CODES: &[&str] = &["busy", "ratelimit", "service_unavailable", "maintenance"];

/// Returned while the source archive of a previous create is still being copied
const CREATE_TRANSIENT_CODES: &[&str] = &["still_creating", "disk_copying"];

/// Classifier vocabulary for the Sakura Cloud API on top of the defaults
pub fn classifier_config() -> ClassifierConfig {
    ClassifierConfig::default().merge(
        &ClassifierConfig::empty()
            .not_found_codes(NOT_FOUND_CODES.iter().copied())
            .transient_codes(TRANSIENT_CODES.iter().copied()),
    )
}

pub fn classifier() -> ErrorClassifier {
    ErrorClassifier::new(classifier_config())
}

/// Parse plan string like "2core-4gb" to (core, memory_gb)
pub fn parse_plan(plan: Option<&str>) -> Result<(i32, i32), SakuraError> {
    let Some(p) = plan else {
        return Ok((1, 1));
    };

    let invalid = || SakuraError::InvalidPlan(p.to_string());
    let (core, memory) = p.split_once('-').ok_or_else(invalid)?;
    let core = core
        .strip_suffix("core")
        .and_then(|c| c.parse::<i32>().ok())
        .filter(|c| *c > 0)
        .ok_or_else(invalid)?;
    let memory = memory
        .strip_suffix("gb")
        .and_then(|m| m.parse::<i32>().ok())
        .filter(|m| *m > 0)
        .ok_or_else(invalid)?;
    Ok((core, memory))
}

/// Desired power state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Up,
    Down,
}

impl PowerState {
    /// The `InstanceStatus` value usacloud reports for this state
    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Up => "up",
            PowerState::Down => "down",
        }
    }

    fn command(self) -> &'static str {
        match self {
            PowerState::Up => "server power-on",
            PowerState::Down => "server shutdown",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired configuration of a server
#[derive(Debug, Clone, Default)]
pub struct ServerSpec {
    pub name: String,
    /// e.g. "2core-4gb"
    pub plan: Option<String>,
    pub disk_size: Option<i32>,
    pub os_type: Option<String>,
    pub ssh_key_ids: Vec<String>,
    pub tags: Vec<String>,
    pub power: PowerState,
}

impl ServerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn create_params(&self) -> Result<Value, SakuraError> {
        let (core, memory) = parse_plan(self.plan.as_deref())?;
        Ok(json!({
            "name": self.name,
            "core": core,
            "memory": memory,
            "disk-size": self.disk_size,
            "os-type": self.os_type,
            "disk-edit-ssh-key-id": self.ssh_key_ids,
            "tags": self.tags,
            "boot-after-create": self.power == PowerState::Up,
        }))
    }
}

/// Sakura Cloud server provider
pub struct SakuraCloudProvider<T = Usacloud> {
    transport: T,
    zone: String,
    classifier: ErrorClassifier,
    timeouts: Timeouts,
    retry_policy: RetryPolicy,
    poll_interval: (Duration, Duration),
}

impl SakuraCloudProvider<Usacloud> {
    pub fn new(zone: impl Into<String>) -> Self {
        let zone = zone.into();
        Self::with_transport(Usacloud::new(zone.clone()), zone)
    }
}

impl<T: stratus_cloud::Transport> SakuraCloudProvider<T> {
    pub fn with_transport(transport: T, zone: impl Into<String>) -> Self {
        Self {
            transport,
            zone: zone.into(),
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

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    fn retry(&self, deadline: Deadline, operation: &str) -> Retry<'_> {
        Retry::with_deadline(&self.classifier, deadline)
            .policy(self.retry_policy.clone())
            .operation(operation)
    }

    fn poll_target(&self, id: &str, deadline: Deadline, label: &str) -> PollTarget<String> {
        PollTarget::new(id, deadline.remaining())
            .label(label)
            .interval(self.poll_interval.0, self.poll_interval.1)
    }

    /// A single read, without retries
    async fn read_server(&self, id: &str) -> Result<ServerInfo, OperationError> {
        let value = self.transport.call("server read", &json!({ "id": id })).await?;
        first_server("server read", value)
    }

    /// Find a server by exact name
    pub async fn find_by_name(&self, name: &str) -> stratus_cloud::Result<Option<ServerInfo>> {
        let params = json!({ "names": [name] });
        let deadline = Deadline::after(self.timeouts.read);
        let value = self
            .retry(deadline, "server list")
            .run(|| self.transport.call("server list", &params))
            .await?;

        let servers: Vec<ServerInfo> = match value {
            Value::Null => Vec::new(),
            other => decode("server list", other)?,
        };
        Ok(servers.into_iter().find(|s| s.name == name))
    }

    async fn wait_availability(&self, id: &str, deadline: Deadline) -> stratus_cloud::Result<()> {
        let target = self
            .poll_target(id, deadline, "server availability")
            .targets(["available"])
            .fail_states(["failed"])
            .allow_missing();
        StatePoller::new(&self.classifier)
            .wait(&target, || self.read_server(id), ServerInfo::availability)
            .await?;
        Ok(())
    }

    async fn wait_power(
        &self,
        id: &str,
        power: PowerState,
        deadline: Deadline,
    ) -> stratus_cloud::Result<ServerInfo> {
        let target = self
            .poll_target(id, deadline, &format!("server power {}", power))
            .targets([power.as_str()]);
        let outcome = StatePoller::new(&self.classifier)
            .wait(&target, || self.read_server(id), ServerInfo::instance_status)
            .await?;
        outcome.into_snapshot().ok_or_else(|| {
            CloudError::from(OperationError::fatal(format!("server {} vanished while waiting", id)))
        })
    }

    /// Request a power transition and wait for it
    pub async fn set_power(&self, id: &str, power: PowerState) -> stratus_cloud::Result<ServerInfo> {
        let deadline = Deadline::after(self.timeouts.update);
        self.request_power(id, power, deadline).await?;
        self.wait_power(id, power, deadline).await
    }

    async fn request_power(
        &self,
        id: &str,
        power: PowerState,
        deadline: Deadline,
    ) -> stratus_cloud::Result<()> {
        tracing::info!(server_id = %id, power = %power, "changing power state");
        let params = json!({ "id": id });
        self.retry(deadline, power.command())
            .run(|| self.transport.call(power.command(), &params))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<T: stratus_cloud::Transport> ResourceProvider for SakuraCloudProvider<T> {
    type Spec = ServerSpec;
    type Snapshot = ServerInfo;

    fn name(&self) -> &str {
        "sakura-cloud"
    }

    fn resource_type(&self) -> &str {
        "server"
    }

    async fn create(&self, spec: &ServerSpec) -> stratus_cloud::Result<ServerInfo> {
        let deadline = Deadline::after(self.timeouts.create);
        let params = spec.create_params().map_err(OperationError::from)?;

        tracing::info!(name = %spec.name, zone = %self.zone, "creating server");
        let created = self
            .retry(deadline, "server create")
            .transient_codes(CREATE_TRANSIENT_CODES.iter().copied())
            .run(|| self.transport.call("server create", &params))
            .await;

        let (id, adopted) = match created {
            Ok(value) => (first_server("server create", value)?.id_str(), false),
            Err(err) if self.classifier.is_already_exists(&err) => {
                match self.find_by_name(&spec.name).await? {
                    Some(existing) => {
                        tracing::info!(
                            name = %spec.name,
                            server_id = %existing.id_str(),
                            "server already exists, adopting it"
                        );
                        (existing.id_str(), true)
                    }
                    None => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        self.wait_availability(&id, deadline).await?;

        if adopted {
            let current = self.retry(deadline, "server read").run(|| self.read_server(&id)).await?;
            if current.instance_status.as_deref() != Some(spec.power.as_str()) {
                self.request_power(&id, spec.power, deadline).await?;
            }
        }

        let server = self.wait_power(&id, spec.power, deadline).await?;
        tracing::info!(name = %server.name, server_id = %id, "server ready");
        Ok(server)
    }

    async fn read(&self, id: &str) -> stratus_cloud::Result<Option<ServerInfo>> {
        let deadline = Deadline::after(self.timeouts.read);
        let result = self.retry(deadline, "server read").run(|| self.read_server(id)).await;
        ignore_not_found(&self.classifier, result)
    }

    async fn update(&self, id: &str, spec: &ServerSpec) -> stratus_cloud::Result<ServerInfo> {
        let deadline = Deadline::after(self.timeouts.update);
        let current = self.retry(deadline, "server read").run(|| self.read_server(id)).await?;

        if current.name != spec.name || current.tags != spec.tags {
            let params = json!({ "id": id, "name": spec.name, "tags": spec.tags });
            self.retry(deadline, "server update")
                .run(|| self.transport.call("server update", &params))
                .await?;
        }

        if current.instance_status.as_deref() != Some(spec.power.as_str()) {
            self.request_power(id, spec.power, deadline).await?;
        }

        self.wait_power(id, spec.power, deadline).await
    }

    async fn delete(&self, id: &str) -> stratus_cloud::Result<()> {
        let deadline = Deadline::after(self.timeouts.delete);

        let read = self.retry(deadline, "server read").run(|| self.read_server(id)).await;
        let Some(current) = ignore_not_found(&self.classifier, read)? else {
            tracing::info!(server_id = %id, "server already deleted");
            return Ok(());
        };

        if current.instance_status.as_deref() != Some(PowerState::Down.as_str()) {
            self.request_power(id, PowerState::Down, deadline).await?;
            self.wait_power(id, PowerState::Down, deadline).await?;
        }

        let params = json!({ "id": id, "with-disks": true });
        let deleted = self
            .retry(deadline, "server delete")
            .run(|| self.transport.call("server delete", &params))
            .await;
        ignore_not_found(&self.classifier, deleted)?;

        let target = self
            .poll_target(id, deadline, "server delete")
            .until_absent();
        StatePoller::new(&self.classifier)
            .wait(&target, || self.read_server(id), ServerInfo::instance_status)
            .await?;

        tracing::info!(server_id = %id, "server deleted");
        Ok(())
    }
}

/// usacloud prints either one server or a list of them
fn first_server(action: &str, value: Value) -> Result<ServerInfo, OperationError> {
    match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => decode(action, first),
            None => Err(OperationError::not_found(format!("'{}' returned no server", action))
                .with_origin("usacloud")),
        },
        other => decode(action, other),
    }
}
