//! Execution context manager: one browser, many disposable sessions.

use std::sync::Arc;

use crucible_protocol::LaunchConfig;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::BrowserEngine;
use crate::error::{Error, Result};

/// One disposable (context, page) pair.
///
/// Exclusively owned by the execution unit that opened it and spent by
/// [`ContextManager::close_session`]; a session never outlives its job.
pub struct Session<E: BrowserEngine> {
    pub(crate) context: E::Context,
    pub(crate) page: E::Page,
}

impl<E: BrowserEngine> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Owns the single long-lived browser handle and hands out isolated
/// sessions.
///
/// `start`/`stop` take the write half of the lifecycle lock and are thereby
/// mutually exclusive with in-flight `open_session`/`close_session` calls,
/// which share the read half. Session creation needs no further locking:
/// the engine tolerates concurrent context creation on one browser.
pub struct ContextManager<E: BrowserEngine> {
    engine: Arc<E>,
    config: LaunchConfig,
    browser: RwLock<Option<E::Browser>>,
}

impl<E: BrowserEngine> ContextManager<E> {
    pub fn new(engine: Arc<E>, config: LaunchConfig) -> Self {
        Self {
            engine,
            config,
            browser: RwLock::new(None),
        }
    }

    /// Launches the browser. Calling on an already-started manager is a
    /// no-op.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.browser.write().await;
        if guard.is_some() {
            debug!(target = "crucible.engine", "start: browser already running");
            return Ok(());
        }
        let browser = self.engine.launch(&self.config).await?;
        info!(
            target = "crucible.engine",
            headless = self.config.headless,
            sandbox_disabled = self.config.sandbox_disabled,
            "browser engine started"
        );
        *guard = Some(browser);
        Ok(())
    }

    pub async fn is_started(&self) -> bool {
        self.browser.read().await.is_some()
    }

    /// Opens a fresh (context, page) pair for one job.
    ///
    /// Fails with [`Error::NotStarted`] before [`start`](Self::start), and
    /// with [`Error::Session`] when the engine refuses. A context created
    /// before a failed page open is closed again before returning.
    pub async fn open_session(&self) -> Result<Session<E>> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(Error::NotStarted)?;
        let context = self.engine.new_context(browser).await?;
        let page = match self.engine.new_page(browser, &context).await {
            Ok(page) => page,
            Err(err) => {
                if let Err(close_err) = self.engine.close_context(browser, context).await {
                    warn!(
                        target = "crucible.engine",
                        error = %close_err,
                        "failed to close context after page-open failure"
                    );
                }
                return Err(err);
            }
        };
        debug!(target = "crucible.engine", "opened isolated session");
        Ok(Session { context, page })
    }

    /// Evaluates a script inside the session's page.
    pub async fn evaluate(&self, session: &Session<E>, script: &str) -> Result<Value> {
        self.engine.evaluate(&session.page, script).await
    }

    /// Scoped release: page first, then context, each independently.
    ///
    /// Close errors are demoted to warnings; closing an already-terminated
    /// session never raises to the caller, and the session is spent either
    /// way.
    pub async fn close_session(&self, session: Session<E>) {
        let guard = self.browser.read().await;
        let Session { context, page } = session;
        if let Err(err) = self.engine.close_page(page).await {
            warn!(target = "crucible.engine", error = %err, "failed to close page");
        }
        match guard.as_ref() {
            Some(browser) => {
                if let Err(err) = self.engine.close_context(browser, context).await {
                    warn!(target = "crucible.engine", error = %err, "failed to close context");
                }
            }
            None => warn!(
                target = "crucible.engine",
                "browser already stopped; dropping context handle"
            ),
        }
    }

    /// Stops the browser, force-closing any sessions still nominally open.
    ///
    /// Teardown failures are logged, not escalated.
    pub async fn stop(&self) {
        let mut guard = self.browser.write().await;
        match guard.take() {
            Some(browser) => {
                if let Err(err) = self.engine.close_browser(browser).await {
                    warn!(target = "crucible.engine", error = %err, "browser close reported an error");
                }
                info!(target = "crucible.engine", "browser engine stopped");
            }
            None => debug!(target = "crucible.engine", "stop: browser not running"),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn launch_config(&self) -> &LaunchConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    fn manager() -> ContextManager<MockEngine> {
        ContextManager::new(Arc::new(MockEngine::new()), LaunchConfig::default())
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let manager = manager();
        let counters = manager.engine.counters();
        manager.start().await.unwrap();
        manager.start().await.unwrap();
        assert_eq!(counters.browsers_launched.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn launch_failure_surfaces_as_launch_error() {
        let manager = manager();
        manager.engine.fail_next_launch();
        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
        assert!(!manager.is_started().await);
    }

    #[tokio::test]
    async fn open_session_before_start_is_a_session_error() {
        let manager = manager();
        let err = manager.open_session().await.unwrap_err();
        assert!(matches!(err, Error::NotStarted));
    }

    #[tokio::test]
    async fn close_session_swallows_page_close_errors() {
        let manager = manager();
        let counters = manager.engine.counters();
        manager.start().await.unwrap();
        let session = manager.open_session().await.unwrap();
        manager.engine.fail_page_close();
        manager.close_session(session).await;
        // Context still released even though the page close failed.
        assert_eq!(counters.contexts_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_safe_with_sessions_still_open() {
        let manager = manager();
        let counters = manager.engine.counters();
        manager.start().await.unwrap();
        let open = manager.open_session().await.unwrap();
        manager.stop().await;
        assert_eq!(counters.browsers_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
        // Releasing the stale session afterwards must not raise.
        manager.close_session(open).await;
    }
}
