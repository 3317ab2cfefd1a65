//! crucible: isolated script execution over disposable browser contexts.
//!
//! One long-lived browser engine serves many concurrent, mutually isolated
//! script evaluations. Each job gets a fresh browsing context and page, is
//! evaluated under a configurable execution bound, and always tears its
//! session down before a terminal outcome is reported. A script that
//! throws, hangs, or panics its worker never affects a sibling job.
//!
//! # Example
//!
//! ```ignore
//! use crucible::{CdpEngine, Dispatcher, DispatcherConfig, LaunchConfig};
//!
//! #[tokio::main]
//! async fn main() -> crucible::Result<()> {
//!     let dispatcher = Dispatcher::new(
//!         CdpEngine::new(),
//!         LaunchConfig::default(),
//!         DispatcherConfig::default(),
//!     );
//!     dispatcher.start().await?;
//!
//!     let outcome = dispatcher.submit("1 + 1").await?;
//!     assert!(outcome.is_success());
//!
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cdp;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod manager;
pub mod testing;
pub mod unit;

pub use cdp::CdpEngine;
pub use dispatch::{DispatchStats, Dispatcher, JobHandle, JobState};
pub use engine::BrowserEngine;
pub use error::{Error, Result};
pub use manager::{ContextManager, Session};
pub use unit::ExecutionUnit;

// Re-export the shared data model for convenience.
pub use crucible_protocol::{
    DEFAULT_EVAL_TIMEOUT_MS, DispatcherConfig, ExecutionOutcome, ExecutionRequest, FailureKind,
    IsolationMode, LaunchConfig, RequestId,
};
