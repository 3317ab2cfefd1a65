//! Deterministic in-process engine for tests.
//!
//! Scripts are interpreted, not executed. The small language covers the
//! behaviors the execution core must contain:
//!
//! - `"1+1"` — integer addition, resolves to the sum
//! - `"throw new Error('x')"` — fails evaluation with `Error: x`
//! - `"sleep:<ms>"` — resolves to `<ms>` after that many milliseconds
//! - `"hang"` — never resolves
//! - any JSON literal — resolves to itself
//!
//! Everything else resolves to null. Open/close calls are counted so tests
//! can assert that every session is released exactly once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crucible_protocol::LaunchConfig;
use serde_json::Value;

use crate::engine::BrowserEngine;
use crate::error::{Error, Result};

/// Open/close accounting shared between a [`MockEngine`] and its tests.
#[derive(Debug, Default)]
pub struct MockCounters {
    pub browsers_launched: AtomicUsize,
    pub browsers_closed: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    live_evals: AtomicUsize,
    /// High-water mark of concurrently in-flight evaluations.
    pub max_concurrent_evals: AtomicUsize,
}

impl MockCounters {
    /// True when every opened handle has been closed again.
    pub fn drained(&self) -> bool {
        self.contexts_opened.load(Ordering::SeqCst) == self.contexts_closed.load(Ordering::SeqCst)
            && self.pages_opened.load(Ordering::SeqCst) == self.pages_closed.load(Ordering::SeqCst)
            && self.browsers_launched.load(Ordering::SeqCst)
                == self.browsers_closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockBrowser {
    #[allow(dead_code)]
    id: usize,
}

#[derive(Debug)]
pub struct MockContext {
    id: usize,
}

#[derive(Debug)]
pub struct MockPage {
    #[allow(dead_code)]
    context_id: usize,
}

/// Browser-engine double with scripted evaluation and failure injection.
#[derive(Debug, Default)]
pub struct MockEngine {
    counters: Arc<MockCounters>,
    next_id: AtomicUsize,
    fail_launch: AtomicBool,
    fail_session: AtomicBool,
    fail_page_close: AtomicBool,
    eval_order: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    /// Makes the next `launch` call fail with a `Launch` error.
    pub fn fail_next_launch(&self) {
        self.fail_launch.store(true, Ordering::SeqCst);
    }

    /// Makes the next `new_context` call fail with a `Session` error.
    pub fn fail_next_session(&self) {
        self.fail_session.store(true, Ordering::SeqCst);
    }

    /// Makes every page close fail, for exercising teardown-warning paths.
    pub fn fail_page_close(&self) {
        self.fail_page_close.store(true, Ordering::SeqCst);
    }

    /// Scripts in the order their evaluation started.
    pub fn eval_order(&self) -> Vec<String> {
        self.eval_order.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Decrements the live-eval gauge even when the evaluation future is
/// dropped mid-flight (timeout, cancellation).
struct EvalGauge<'a>(&'a MockCounters);

impl Drop for EvalGauge<'_> {
    fn drop(&mut self) {
        self.0.live_evals.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    type Browser = MockBrowser;
    type Context = MockContext;
    type Page = MockPage;

    async fn launch(&self, _config: &LaunchConfig) -> Result<MockBrowser> {
        if self.fail_launch.swap(false, Ordering::SeqCst) {
            return Err(Error::Launch("mock engine refused to start".into()));
        }
        self.counters.browsers_launched.fetch_add(1, Ordering::SeqCst);
        Ok(MockBrowser {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn new_context(&self, _browser: &MockBrowser) -> Result<MockContext> {
        if self.fail_session.swap(false, Ordering::SeqCst) {
            return Err(Error::Session("mock engine refused the context".into()));
        }
        self.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockContext {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn new_page(&self, _browser: &MockBrowser, context: &MockContext) -> Result<MockPage> {
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockPage {
            context_id: context.id,
        })
    }

    async fn evaluate(&self, _page: &MockPage, script: &str) -> Result<Value> {
        self.eval_order
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(script.to_string());
        let live = self.counters.live_evals.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_concurrent_evals.fetch_max(live, Ordering::SeqCst);
        let _gauge = EvalGauge(&self.counters);
        eval_script(script).await
    }

    async fn close_page(&self, _page: MockPage) -> Result<()> {
        if self.fail_page_close.load(Ordering::SeqCst) {
            return Err(Error::Session("mock page refused to close".into()));
        }
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_context(&self, _browser: &MockBrowser, _context: MockContext) -> Result<()> {
        self.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_browser(&self, _browser: MockBrowser) -> Result<()> {
        self.counters.browsers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Interprets the small script language described in the module docs.
async fn eval_script(script: &str) -> Result<Value> {
    let script = script.trim();
    if script == "hang" {
        std::future::pending::<()>().await;
        unreachable!();
    }
    if let Some(ms) = script.strip_prefix("sleep:") {
        let ms: u64 = ms
            .parse()
            .map_err(|_| Error::Evaluation(format!("invalid sleep duration: {ms}")))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        return Ok(Value::from(ms));
    }
    if let Some(rest) = script.strip_prefix("throw new Error(") {
        let message = rest
            .trim_end_matches(')')
            .trim_matches(|c| c == '\'' || c == '"');
        return Err(Error::Evaluation(format!("Error: {message}")));
    }
    if let Some((lhs, rhs)) = script.split_once('+') {
        if let (Ok(a), Ok(b)) = (lhs.trim().parse::<i64>(), rhs.trim().parse::<i64>()) {
            return Ok(Value::from(a + b));
        }
    }
    Ok(serde_json::from_str(script).unwrap_or(Value::Null))
}
