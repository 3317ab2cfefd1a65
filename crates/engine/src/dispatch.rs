//! Dispatcher: FIFO intake, a fixed worker pool, id-correlated outcomes.
//!
//! Requests queue in submission order and start in that order once a slot
//! frees; outcomes complete in any order and are correlated back to their
//! request by id. Each job runs inside its own spawned task so that a
//! panic, hang, or failure in one execution unit cannot reach a sibling or
//! the dispatcher itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crucible_protocol::{
    DispatcherConfig, ExecutionOutcome, ExecutionRequest, FailureKind, IsolationMode,
    LaunchConfig, RequestId,
};
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::BrowserEngine;
use crate::error::{Error, Result};
use crate::manager::ContextManager;
use crate::unit::ExecutionUnit;

/// Lifecycle of one request inside the dispatcher. Terminal states are
/// final; a terminal job leaves the tracking table once its outcome is
/// delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Snapshot of dispatcher load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Pending outcome for a submitted request.
pub struct JobHandle {
    id: RequestId,
    outcome_rx: oneshot::Receiver<ExecutionOutcome>,
}

impl JobHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Waits for the terminal outcome of this request.
    pub async fn outcome(self) -> Result<ExecutionOutcome> {
        self.outcome_rx.await.map_err(|_| Error::ShuttingDown)
    }
}

struct QueuedJob {
    request: ExecutionRequest,
}

struct JobEntry {
    state: JobState,
    cancel_tx: watch::Sender<bool>,
    /// Taken exactly once, when the terminal outcome is delivered.
    outcome_tx: Option<oneshot::Sender<ExecutionOutcome>>,
}

struct DispatcherInner<E: BrowserEngine> {
    engine: Arc<E>,
    launch_config: LaunchConfig,
    config: DispatcherConfig,
    /// Shared browser for [`IsolationMode::Shared`]; idle in per-job mode.
    manager: Arc<ContextManager<E>>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<QueuedJob>>,
    jobs: DashMap<RequestId, JobEntry>,
    shutdown_rx: watch::Receiver<bool>,
    closed: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Routes execution requests to a pool of concurrent execution units.
pub struct Dispatcher<E: BrowserEngine> {
    inner: Arc<DispatcherInner<E>>,
    queue_tx: mpsc::UnboundedSender<QueuedJob>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: BrowserEngine> Dispatcher<E> {
    /// Builds a dispatcher and spawns its worker pool. Must be called from
    /// within a Tokio runtime.
    pub fn new(engine: E, launch_config: LaunchConfig, config: DispatcherConfig) -> Self {
        let engine = Arc::new(engine);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::new(ContextManager::new(
            Arc::clone(&engine),
            launch_config.clone(),
        ));
        let pool_size = config.pool_size.max(1);

        let inner = Arc::new(DispatcherInner {
            engine,
            launch_config,
            config,
            manager,
            queue_rx: Mutex::new(queue_rx),
            jobs: DashMap::new(),
            shutdown_rx,
            closed: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let workers = (0..pool_size)
            .map(|slot| {
                let inner = Arc::clone(&inner);
                tokio::spawn(worker_loop(inner, slot))
            })
            .collect();

        Self {
            inner,
            queue_tx,
            shutdown_tx,
            workers: Mutex::new(workers),
        }
    }

    /// Starts the shared browser in shared-pool mode, surfacing launch
    /// failures to the operator. Per-job mode launches lazily per request
    /// and needs no upfront start.
    pub async fn start(&self) -> Result<()> {
        match self.inner.config.isolation {
            IsolationMode::Shared => self.inner.manager.start().await,
            IsolationMode::PerJob => Ok(()),
        }
    }

    /// Submits a script and waits for its terminal outcome.
    pub async fn submit(&self, script: impl Into<String>) -> Result<ExecutionOutcome> {
        self.submit_request(ExecutionRequest::new(script))?
            .outcome()
            .await
    }

    /// Enqueues a request and returns a handle resolving to its outcome.
    pub fn submit_request(&self, request: ExecutionRequest) -> Result<JobHandle> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (cancel_tx, _) = watch::channel(false);
        let id = request.id.clone();
        self.inner.jobs.insert(
            id.clone(),
            JobEntry {
                state: JobState::Queued,
                cancel_tx,
                outcome_tx: Some(outcome_tx),
            },
        );
        if self.queue_tx.send(QueuedJob { request }).is_err() {
            self.inner.jobs.remove(&id);
            return Err(Error::ShuttingDown);
        }
        debug!(target = "crucible.dispatch", id = %id, "request queued");
        Ok(JobHandle { id, outcome_rx })
    }

    /// Requests cancellation of a queued or running job.
    ///
    /// A queued job resolves to a `Cancelled` failure immediately, without
    /// ever opening a session; a running job is torn down the same way a
    /// timeout is. Returns false when the id is unknown or already
    /// terminal.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let Some(mut entry) = self.inner.jobs.get_mut(id) else {
            return false;
        };
        match entry.state {
            JobState::Queued => {
                let outcome_tx = entry.outcome_tx.take();
                drop(entry);
                self.inner.jobs.remove(id);
                self.inner.failed.fetch_add(1, Ordering::SeqCst);
                if let Some(tx) = outcome_tx {
                    let _ = tx.send(ExecutionOutcome::failure(
                        FailureKind::Cancelled,
                        "cancelled while queued",
                    ));
                }
                debug!(target = "crucible.dispatch", id = %id, "queued request cancelled");
                true
            }
            JobState::Running => {
                debug!(target = "crucible.dispatch", id = %id, "cancelling running request");
                let _ = entry.cancel_tx.send(true);
                true
            }
            JobState::Completed | JobState::Failed => false,
        }
    }

    /// Returns the current state of a request while it is still tracked.
    pub fn state(&self, id: &RequestId) -> Option<JobState> {
        self.inner.jobs.get(id).map(|entry| entry.state)
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    pub fn stats(&self) -> DispatchStats {
        let mut queued = 0;
        let mut running = 0;
        for entry in self.inner.jobs.iter() {
            match entry.state {
                JobState::Queued => queued += 1,
                JobState::Running => running += 1,
                JobState::Completed | JobState::Failed => {}
            }
        }
        DispatchStats {
            queued,
            running,
            completed: self.inner.completed.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    /// Stops intake, cancels queued and running work, waits for the pool
    /// to drain, and releases the browser. Every submitted request still
    /// receives a terminal outcome; none is silently dropped.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target = "crucible.dispatch", "dispatcher shutting down");
        let _ = self.shutdown_tx.send(true);

        self.drain_queue().await;

        // Force-teardown anything still running.
        for entry in self.inner.jobs.iter() {
            let _ = entry.cancel_tx.send(true);
        }

        let mut workers = self.workers.lock().await;
        for worker in workers.drain(..) {
            if let Err(err) = worker.await {
                if err.is_panic() {
                    warn!(target = "crucible.dispatch", "worker task panicked during shutdown");
                }
            }
        }

        // A submission may have slipped in between the intake check and the
        // shutdown signal; flush once more now that the pool is quiet.
        self.drain_queue().await;

        self.inner.manager.stop().await;
    }

    /// Closes intake and resolves everything still sitting in the queue as
    /// cancelled. Closing makes any racing submission fail cleanly instead
    /// of stranding a job no worker will ever pop.
    async fn drain_queue(&self) {
        let mut queue = self.inner.queue_rx.lock().await;
        queue.close();
        while let Ok(job) = queue.try_recv() {
            self.inner.resolve(
                &job.request.id,
                ExecutionOutcome::failure(
                    FailureKind::Cancelled,
                    "dispatcher shut down before execution",
                ),
            );
        }
    }
}

impl<E: BrowserEngine> DispatcherInner<E> {
    /// Delivers the terminal outcome for a request and retires its entry.
    fn resolve(&self, id: &RequestId, outcome: ExecutionOutcome) {
        let Some((_, entry)) = self.jobs.remove(id) else {
            // Already resolved, e.g. cancelled while queued.
            return;
        };
        match &outcome {
            ExecutionOutcome::Success { .. } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            ExecutionOutcome::Failure { kind, message } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                debug!(
                    target = "crucible.dispatch",
                    id = %id,
                    kind = %kind,
                    message = %message,
                    "request failed"
                );
            }
        }
        if let Some(tx) = entry.outcome_tx {
            if tx.send(outcome).is_err() {
                debug!(
                    target = "crucible.dispatch",
                    id = %id,
                    "submitter went away before outcome delivery"
                );
            }
        }
    }
}

async fn worker_loop<E: BrowserEngine>(inner: Arc<DispatcherInner<E>>, slot: usize) {
    let mut shutdown_rx = inner.shutdown_rx.clone();
    loop {
        let job = {
            let mut queue = inner.queue_rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => None,
                job = queue.recv() => job,
            }
        };
        let Some(job) = job else { break };
        process_job(&inner, job.request, slot).await;
    }
    debug!(target = "crucible.dispatch", slot, "worker stopped");
}

async fn process_job<E: BrowserEngine>(
    inner: &Arc<DispatcherInner<E>>,
    request: ExecutionRequest,
    slot: usize,
) {
    let id = request.id.clone();

    let cancel_rx = match inner.jobs.get_mut(&id) {
        Some(mut entry) => {
            entry.state = JobState::Running;
            entry.cancel_tx.subscribe()
        }
        // Cancelled while queued; its outcome is already delivered.
        None => return,
    };
    debug!(target = "crucible.dispatch", id = %id, slot, "request running");

    // A task per job keeps a panicking execution unit from taking the
    // worker slot down with it.
    let unit = ExecutionUnit::new(inner.config.eval_timeout());
    let task = {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            match inner.config.isolation {
                IsolationMode::Shared => {
                    unit.run_cancellable(&inner.manager, &request, cancel_rx)
                        .await
                }
                IsolationMode::PerJob => run_per_job(&inner, &unit, &request, cancel_rx).await,
            }
        })
    };

    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => {
            warn!(
                target = "crucible.dispatch",
                id = %id,
                slot,
                "execution task panicked; containing the failure to this request"
            );
            ExecutionOutcome::failure(FailureKind::Evaluation, "execution task panicked")
        }
        Err(_) => ExecutionOutcome::failure(FailureKind::Cancelled, "execution task aborted"),
    };
    inner.resolve(&id, outcome);
}

/// Per-job topology: a fresh browser launched, used, and torn down for one
/// request.
async fn run_per_job<E: BrowserEngine>(
    inner: &DispatcherInner<E>,
    unit: &ExecutionUnit,
    request: &ExecutionRequest,
    cancel_rx: watch::Receiver<bool>,
) -> ExecutionOutcome {
    let manager = ContextManager::new(Arc::clone(&inner.engine), inner.launch_config.clone());
    if let Err(err) = manager.start().await {
        warn!(
            target = "crucible.dispatch",
            id = %request.id,
            error = %err,
            "per-job browser launch failed"
        );
        return ExecutionOutcome::from(err);
    }
    let outcome = unit.run_cancellable(&manager, request, cancel_rx).await;
    manager.stop().await;
    outcome
}
