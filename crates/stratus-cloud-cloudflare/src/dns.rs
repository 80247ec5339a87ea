//! Cloudflare API client
//!
//! Direct Cloudflare API implementation using Bearer token authentication.
//! Every response goes through [`parse_envelope`]: Cloudflare can answer
//! `200 OK` with `"success": false`, and that has to look exactly like an
//! HTTP-level failure to the classifier.

use crate::error::{CloudflareError, Result, request_error};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use stratus_cloud::{ErrorKind, OperationError, Transport};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for DNS management
#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub api_token: String,
    pub zone_id: String,
    pub domain: String,
}

impl DnsConfig {
    /// Create DnsConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var("CLOUDFLARE_API_TOKEN")
            .map_err(|_| CloudflareError::MissingEnvVar("CLOUDFLARE_API_TOKEN".to_string()))?;
        let zone_id = std::env::var("CLOUDFLARE_ZONE_ID")
            .map_err(|_| CloudflareError::MissingEnvVar("CLOUDFLARE_ZONE_ID".to_string()))?;
        let domain = std::env::var("CLOUDFLARE_DOMAIN")
            .map_err(|_| CloudflareError::MissingEnvVar("CLOUDFLARE_DOMAIN".to_string()))?;

        Ok(Self {
            api_token,
            zone_id,
            domain,
        })
    }

    /// Get the full domain name for a subdomain; names already inside the zone are kept
    pub fn full_domain(&self, name: &str) -> String {
        let name = name.trim_end_matches('.');
        if name == self.domain || name.ends_with(&format!(".{}", self.domain)) {
            name.to_string()
        } else {
            format!("{}.{}", name, self.domain)
        }
    }
}

/// HTTP transport for the Cloudflare v4 API
///
/// Actions are `"METHOD path"`, e.g. `"GET zones/abc/dns_records"`. For
/// `GET` and `DELETE` the parameters become the query string, otherwise
/// they are sent as the JSON body.
#[derive(Debug, Clone)]
pub struct CloudflareApi {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

impl CloudflareApi {
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_token: api_token.into(),
            base_url: CLOUDFLARE_API_BASE.to_string(),
        })
    }

    /// Point the client at another endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Transport for CloudflareApi {
    async fn call(&self, action: &str, params: &Value) -> std::result::Result<Value, OperationError> {
        let (method, path) = split_action(action)?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        tracing::debug!(%method, %url, "cloudflare request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_token);
        if !params.is_null() {
            request = if method == Method::GET || method == Method::DELETE {
                request.query(&query_pairs(action, params)?)
            } else {
                request.json(params)
            };
        }

        let response = request.send().await.map_err(|e| request_error(action, e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| request_error(action, e))?;

        parse_envelope(action, status, &body).inspect_err(|err| {
            tracing::debug!(%method, %url, status, error = %err, "cloudflare error response");
        })
    }
}

fn split_action(action: &str) -> Result<(Method, &str)> {
    let invalid = || CloudflareError::InvalidAction(action.to_string());
    let (method, path) = action.trim().split_once(' ').ok_or_else(invalid)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| invalid())?;
    Ok((method, path.trim()))
}

fn query_pairs(action: &str, params: &Value) -> Result<Vec<(String, String)>> {
    let Value::Object(map) = params else {
        return Err(CloudflareError::InvalidAction(format!(
            "{} (query parameters must be an object)",
            action
        )));
    };
    Ok(map
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k.clone(), s.clone())),
            other => Some((k.clone(), other.to_string())),
        })
        .collect())
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

/// Turn a Cloudflare response into the `result` payload or an [`OperationError`].
///
/// The first entry of `errors` supplies the provider code; all messages are
/// kept. A body that is not an API envelope is reported with the HTTP status
/// only.
pub fn parse_envelope(
    action: &str,
    status: u16,
    body: &str,
) -> std::result::Result<Value, OperationError> {
    let ok_status = (200..300).contains(&status);

    let envelope: ApiResponse = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if ok_status => {
            return Err(OperationError::new(
                ErrorKind::Fatal,
                format!("unexpected response to '{}'", action),
            )
            .with_status(status)
            .with_origin("cloudflare")
            .with_source(e));
        }
        Err(_) => {
            let text = body.trim();
            let message = if text.is_empty() {
                format!("{} returned HTTP {}", action, status)
            } else {
                format!("{} returned HTTP {}: {}", action, status, text)
            };
            return Err(OperationError::unclassified(message)
                .with_status(status)
                .with_origin("cloudflare"));
        }
    };

    if envelope.success && ok_status {
        return Ok(envelope.result);
    }

    let message = if envelope.errors.is_empty() {
        format!("{} failed (HTTP {})", action, status)
    } else {
        envelope
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };

    let mut err = OperationError::unclassified(message)
        .with_status(status)
        .with_origin("cloudflare");
    if let Some(first) = envelope.errors.first() {
        err = err.with_code(first.code.to_string());
    }
    Err(err)
}

/// A DNS record as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub proxied: bool,
}

/// Desired DNS record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsRecordSpec {
    /// Subdomain or fully qualified name
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    /// 1 means automatic
    pub ttl: u32,
    pub proxied: bool,
}

impl DnsRecordSpec {
    /// An unproxied A record with automatic TTL
    pub fn a(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_type: "A".to_string(),
            content: ip.into(),
            ttl: 1,
            proxied: false,
        }
    }
}
