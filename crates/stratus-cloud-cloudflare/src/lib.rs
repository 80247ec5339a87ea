//! Cloudflare provider for Stratus
//!
//! DNS records managed through the Cloudflare v4 API.
//!
//! # Requirements
//!
//! - `CLOUDFLARE_API_TOKEN`, `CLOUDFLARE_ZONE_ID`, `CLOUDFLARE_DOMAIN` env vars
//!
//! # DNS Management
//!
//! ```ignore
//! use stratus_cloud_cloudflare::{CloudflareDns, DnsConfig, DnsRecordSpec};
//!
//! let dns = CloudflareDns::new(DnsConfig::from_env()?)?;
//!
//! // Ensure a DNS record exists and is served with this content
//! let record = dns.ensure(&DnsRecordSpec::a("mcp-prod", "203.0.113.1")).await?;
//!
//! // Remove a DNS record
//! dns.remove("mcp-prod", "A").await?;
//! ```

pub mod dns;
pub mod error;
pub mod provider;

pub use dns::{CloudflareApi, DnsConfig, DnsRecordInfo, DnsRecordSpec, parse_envelope};
pub use error::{CloudflareError, Result};
pub use provider::{CloudflareDns, classifier, classifier_config};
