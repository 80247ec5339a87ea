//! Sakura Cloud provider for Stratus
//!
//! Servers on Sakura Cloud, managed through the `usacloud` CLI. The CLI is
//! the transport: its stderr (either the API's JSON error body or usacloud's
//! own struct dump) is parsed into an [`stratus_cloud::OperationError`] so
//! the shared classifier can decide whether to retry.
//!
//! # Requirements
//!
//! - `usacloud` CLI must be installed and configured
//! - Authentication is managed through usacloud configuration
//!
//! # Example
//!
//! ```ignore
//! use stratus_cloud::ResourceProvider;
//! use stratus_cloud_sakura::{SakuraCloudProvider, ServerSpec};
//!
//! let provider = SakuraCloudProvider::new("tk1a");
//! let mut spec = ServerSpec::new("web-01");
//! spec.plan = Some("2core-4gb".to_string());
//!
//! let server = provider.create(&spec).await?;
//! println!("{} is up at {:?}", server.name, server.ip_address());
//! ```

pub mod error;
pub mod provider;
pub mod usacloud;

pub use error::{Result, SakuraError, parse_error_output};
pub use provider::{
    PowerState, SakuraCloudProvider, ServerSpec, classifier, classifier_config, parse_plan,
};
pub use usacloud::{InterfaceInfo, ServerInfo, Usacloud};
