//! Chrome DevTools engine adapter backed by `chromiumoxide`.
//!
//! One headless Chromium process serves the whole manager; every session
//! maps to a dedicated `Target.createBrowserContext` context with a single
//! page target inside it, disposed again when the session closes.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use crucible_protocol::LaunchConfig;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::BrowserEngine;
use crate::error::{Error, Result};

/// Production engine: headless Chromium driven over CDP.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpEngine;

impl CdpEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Launched Chromium plus the task servicing its CDP connection.
pub struct CdpBrowser {
    browser: Browser,
    event_loop: JoinHandle<()>,
}

pub struct CdpContext {
    id: BrowserContextId,
}

#[async_trait]
impl BrowserEngine for CdpEngine {
    type Browser = CdpBrowser;
    type Context = CdpContext;
    type Page = Page;

    async fn launch(&self, config: &LaunchConfig) -> Result<CdpBrowser> {
        let mut builder = BrowserConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        if config.sandbox_disabled {
            builder = builder.no_sandbox().arg("--disable-setuid-sandbox");
        }
        let browser_config = builder.build().map_err(Error::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| Error::Launch(err.to_string()))?;

        // The handler stream must be polled for the connection to make
        // progress; it ends when the browser goes away.
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(target = "crucible.cdp", error = %err, "cdp event loop error");
                }
            }
        });

        Ok(CdpBrowser {
            browser,
            event_loop,
        })
    }

    async fn new_context(&self, browser: &CdpBrowser) -> Result<CdpContext> {
        let response = browser
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|err| Error::Session(err.to_string()))?;
        Ok(CdpContext {
            id: response.result.browser_context_id.clone(),
        })
    }

    async fn new_page(&self, browser: &CdpBrowser, context: &CdpContext) -> Result<Page> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.id.clone())
            .build()
            .map_err(Error::Session)?;
        browser
            .browser
            .new_page(params)
            .await
            .map_err(|err| Error::Session(err.to_string()))
    }

    async fn evaluate(&self, page: &Page, script: &str) -> Result<Value> {
        let evaluation = page
            .evaluate(script)
            .await
            .map_err(|err| Error::Evaluation(err.to_string()))?;
        Ok(evaluation.value().cloned().unwrap_or(Value::Null))
    }

    async fn close_page(&self, page: Page) -> Result<()> {
        page.close()
            .await
            .map_err(|err| Error::Session(err.to_string()))
    }

    async fn close_context(&self, browser: &CdpBrowser, context: CdpContext) -> Result<()> {
        let params = DisposeBrowserContextParams::builder()
            .browser_context_id(context.id)
            .build()
            .map_err(Error::Session)?;
        browser
            .browser
            .execute(params)
            .await
            .map_err(|err| Error::Session(err.to_string()))?;
        Ok(())
    }

    async fn close_browser(&self, browser: CdpBrowser) -> Result<()> {
        let CdpBrowser {
            mut browser,
            event_loop,
        } = browser;
        let closed = browser.close().await;
        if let Err(err) = browser.wait().await {
            warn!(target = "crucible.cdp", error = %err, "browser process did not exit cleanly");
        }
        event_loop.abort();
        closed.map_err(|err| Error::Session(err.to_string()))?;
        Ok(())
    }
}
