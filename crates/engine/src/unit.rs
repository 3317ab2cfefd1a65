//! Execution unit: one request, one session, guaranteed teardown.

use std::time::Duration;

use crucible_protocol::{ExecutionOutcome, ExecutionRequest};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::engine::BrowserEngine;
use crate::error::Error;
use crate::manager::ContextManager;

/// Runs exactly one request to a terminal outcome, never leaking its
/// session and never letting a script error escape.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionUnit {
    timeout: Duration,
}

impl ExecutionUnit {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Evaluates `request.script` in a fresh isolated session.
    ///
    /// Every exit path (success, evaluation failure, timeout, session-open
    /// failure) releases the session before the outcome is returned. The
    /// unit never retries; retry policy is the dispatcher's concern.
    pub async fn run<E: BrowserEngine>(
        &self,
        manager: &ContextManager<E>,
        request: &ExecutionRequest,
    ) -> ExecutionOutcome {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_cancellable(manager, request, cancel_rx).await
    }

    /// Like [`run`](Self::run), but additionally races the evaluation
    /// against a cancel signal. Cancellation takes the same forced-teardown
    /// path as a timeout.
    pub async fn run_cancellable<E: BrowserEngine>(
        &self,
        manager: &ContextManager<E>,
        request: &ExecutionRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionOutcome {
        let session = match manager.open_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(
                    target = "crucible.unit",
                    id = %request.id,
                    error = %err,
                    "session open failed"
                );
                return ExecutionOutcome::from(err);
            }
        };

        let outcome = tokio::select! {
            evaluated = tokio::time::timeout(
                self.timeout,
                manager.evaluate(&session, &request.script),
            ) => match evaluated {
                Ok(Ok(value)) => ExecutionOutcome::success(value),
                Ok(Err(err)) => {
                    debug!(target = "crucible.unit", id = %request.id, error = %err, "evaluation failed");
                    ExecutionOutcome::from(err)
                }
                Err(_) => {
                    let timeout_ms = self.timeout.as_millis() as u64;
                    warn!(
                        target = "crucible.unit",
                        id = %request.id,
                        timeout_ms,
                        "script exceeded execution bound"
                    );
                    ExecutionOutcome::from(Error::Timeout { timeout_ms })
                }
            },
            _ = cancelled(&mut cancel) => {
                debug!(target = "crucible.unit", id = %request.id, "execution cancelled");
                ExecutionOutcome::from(Error::Cancelled)
            }
        };

        // Teardown on every path; its failures never override the outcome.
        manager.close_session(session).await;
        outcome
    }
}

/// Resolves once the cancel flag turns true; never resolves otherwise.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            // Sender dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crucible_protocol::{FailureKind, LaunchConfig};
    use serde_json::json;

    use super::*;
    use crate::testing::MockEngine;

    async fn started_manager() -> ContextManager<MockEngine> {
        let manager = ContextManager::new(Arc::new(MockEngine::new()), LaunchConfig::default());
        manager.start().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn resolved_value_passes_through() {
        let manager = started_manager().await;
        let unit = ExecutionUnit::new(Duration::from_secs(5));
        let outcome = unit.run(&manager, &ExecutionRequest::new("1+1")).await;
        assert_eq!(outcome, ExecutionOutcome::success(json!(2)));
    }

    #[tokio::test]
    async fn teardown_failure_does_not_override_success() {
        let manager = started_manager().await;
        manager.engine().fail_page_close();
        let unit = ExecutionUnit::new(Duration::from_secs(5));
        let outcome = unit.run(&manager, &ExecutionRequest::new("1+1")).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn session_open_failure_is_reported_not_thrown() {
        let manager = started_manager().await;
        manager.engine().fail_next_session();
        let unit = ExecutionUnit::new(Duration::from_secs(5));
        let outcome = unit.run(&manager, &ExecutionRequest::new("1+1")).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Session));
    }
}
