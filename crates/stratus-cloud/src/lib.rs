//! Stratus Cloud
//!
//! The resilient-operation layer shared by every Stratus resource provider.
//! Cloud control planes are eventually consistent and slow, so every
//! mutating call is issued through a retry executor and its completion is
//! awaited with a state poller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          stratus CLI / host orchestrator         │
//! └─────────────────┬───────────────────────────────┘
//!                   │ create / read / update / delete
//! ┌─────────────────▼───────────────────────────────┐
//! │                 stratus-cloud                    │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │ Retry        │  │ StatePoller  │             │
//! │  │ (backoff)    │  │ (wait-for)   │             │
//! │  └──────┬───────┘  └──────┬───────┘             │
//! │         └────────┬────────┘                     │
//! │          ┌───────▼────────┐                     │
//! │          │ ErrorClassifier│                     │
//! │          └────────────────┘                     │
//! └───────┬─────────────────┬───────────────────────┘
//!         │ Transport       │ Transport
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ sakura-cloud  │ │  cloudflare   │
//! │  (usacloud)   │ │   (HTTP API)  │
//! └───────────────┘ └───────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stratus_cloud::{ErrorClassifier, PollTarget, Retry, StatePoller};
//!
//! let classifier = ErrorClassifier::default();
//! let created = Retry::new(&classifier, timeouts.create)
//!     .operation("server create")
//!     .run(|| transport.call("server create", &params))
//!     .await?;
//!
//! let target = PollTarget::<String>::new(id, timeouts.create)
//!     .targets(["up"])
//!     .fail_states(["failed"]);
//! let outcome = StatePoller::new(&classifier)
//!     .wait(&target, || read_server(id), |s| s.instance_status.clone())
//!     .await?;
//! ```

pub mod classify;
pub mod deadline;
pub mod error;
pub mod poll;
pub mod provider;
pub mod retry;
pub mod transport;

// Re-exports
pub use classify::{ClassifierConfig, ErrorClassifier};
pub use deadline::Deadline;
pub use error::{BoxError, CloudError, ErrorKind, OperationError, Result};
pub use poll::{PollTarget, StatePoller, WaitOutcome};
pub use provider::{ResourceProvider, Timeouts, ignore_not_found};
pub use retry::{Growth, MIN_WAIT, Retry, RetryPolicy, Waiter, retry};
pub use transport::{Transport, decode};
