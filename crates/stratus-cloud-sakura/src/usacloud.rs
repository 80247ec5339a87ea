//! usacloud CLI wrapper
//!
//! Implements [`Transport`] on top of the usacloud CLI. An action such as
//! `"server read"` becomes the subcommand, the `id` parameter becomes the
//! positional argument and every other parameter becomes a `--flag`.

use crate::error::{Result, SakuraError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use stratus_cloud::{ErrorKind, OperationError, Transport};
use tokio::process::Command;

/// usacloud CLI wrapper
#[derive(Debug, Clone)]
pub struct Usacloud {
    zone: String,
    program: String,
}

impl Usacloud {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            program: "usacloud".to_string(),
        }
    }

    /// Use a different executable, e.g. a pinned path
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Run a usacloud command and return stdout
    async fn run_command(&self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--zone").arg(&self.zone);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} --zone {} {}", self.program, self.zone, args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SakuraError::UsacloudNotFound
            } else {
                SakuraError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SakuraError::CommandFailed {
                code: output.status.code(),
                stderr: stderr.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Transport for Usacloud {
    async fn call(&self, action: &str, params: &Value) -> std::result::Result<Value, OperationError> {
        let args = build_args(action, params)?;
        let stdout = self.run_command(&args).await?;
        parse_output(action, &stdout)
    }
}

/// Translate an action and its parameters into usacloud arguments
pub fn build_args(action: &str, params: &Value) -> Result<Vec<String>> {
    let mut args: Vec<String> = action.split_whitespace().map(str::to_string).collect();
    if args.is_empty() {
        return Err(SakuraError::InvalidParams {
            action: action.to_string(),
            reason: "empty action".to_string(),
        });
    }

    match params {
        Value::Null => {}
        Value::Object(map) => {
            if let Some(id) = map.get("id") {
                args.push(scalar(action, id)?);
            }
            for (key, value) in map.iter().filter(|(k, _)| k.as_str() != "id") {
                let flag = format!("--{}", key);
                match value {
                    Value::Null | Value::Bool(false) => {}
                    Value::Bool(true) => args.push(flag),
                    Value::Array(items) => {
                        for item in items {
                            args.push(flag.clone());
                            args.push(scalar(action, item)?);
                        }
                    }
                    other => {
                        args.push(flag);
                        args.push(scalar(action, other)?);
                    }
                }
            }
        }
        _ => {
            return Err(SakuraError::InvalidParams {
                action: action.to_string(),
                reason: "parameters must be an object".to_string(),
            });
        }
    }

    args.push("--output-type".to_string());
    args.push("json".to_string());
    args.push("--yes".to_string());
    Ok(args)
}

fn scalar(action: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(SakuraError::InvalidParams {
            action: action.to_string(),
            reason: format!("unsupported value {}", value),
        }),
    }
}

/// Decode usacloud's JSON output; empty output is `null`
pub fn parse_output(action: &str, stdout: &str) -> std::result::Result<Value, OperationError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|e| {
        OperationError::new(ErrorKind::Fatal, format!("invalid JSON from 'usacloud {}'", action))
            .with_origin("usacloud")
            .with_source(e)
    })
}

/// Server information from usacloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "ID")]
    pub id: Value,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "CPU")]
    pub cpu: Option<i32>,

    #[serde(rename = "MemoryMB")]
    pub memory_mb: Option<i32>,

    #[serde(rename = "InstanceStatus")]
    pub instance_status: Option<String>,

    #[serde(rename = "Availability")]
    pub availability: Option<String>,

    #[serde(rename = "Interfaces")]
    pub interfaces: Option<Vec<InterfaceInfo>>,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

impl ServerInfo {
    /// ID as a string; usacloud prints it as a number or a string depending on version
    pub fn id_str(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Get the first IP address
    pub fn ip_address(&self) -> Option<String> {
        self.interfaces
            .as_ref()?
            .iter()
            .find_map(|i| i.ip_address.clone())
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.instance_status.as_deref() == Some("up")
    }

    pub fn instance_status(&self) -> String {
        self.instance_status.clone().unwrap_or_else(|| "unknown".to_string())
    }

    pub fn availability(&self) -> String {
        self.availability.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    #[serde(rename = "IPAddress")]
    pub ip_address: Option<String>,
}
