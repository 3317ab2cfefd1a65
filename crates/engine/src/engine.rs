//! Browser-engine capability boundary.

use async_trait::async_trait;
use crucible_protocol::LaunchConfig;
use serde_json::Value;

use crate::error::Result;

/// Opaque automation capability the execution core drives.
///
/// Implementations translate these verbs onto a concrete engine
/// ([`CdpEngine`](crate::cdp::CdpEngine) in production,
/// [`MockEngine`](crate::testing::MockEngine) in tests). Error mapping is
/// part of the contract: `launch` failures surface as
/// [`Error::Launch`](crate::Error::Launch), context/page creation failures
/// as [`Error::Session`](crate::Error::Session), and anything raised while
/// a script evaluates as [`Error::Evaluation`](crate::Error::Evaluation).
#[async_trait]
pub trait BrowserEngine: Send + Sync + 'static {
    /// Long-lived engine instance handle.
    type Browser: Send + Sync + 'static;
    /// Isolated browsing context handle: own cookies, storage, and globals.
    type Context: Send + Sync + 'static;
    /// Page handle bound to exactly one context.
    type Page: Send + Sync + 'static;

    async fn launch(&self, config: &LaunchConfig) -> Result<Self::Browser>;

    async fn new_context(&self, browser: &Self::Browser) -> Result<Self::Context>;

    async fn new_page(&self, browser: &Self::Browser, context: &Self::Context)
    -> Result<Self::Page>;

    /// Evaluates a script string in the page, resolving promises before
    /// returning. The script is untrusted data and is never re-embedded
    /// into code the caller itself runs.
    async fn evaluate(&self, page: &Self::Page, script: &str) -> Result<Value>;

    async fn close_page(&self, page: Self::Page) -> Result<()>;

    async fn close_context(&self, browser: &Self::Browser, context: Self::Context) -> Result<()>;

    async fn close_browser(&self, browser: Self::Browser) -> Result<()>;
}
