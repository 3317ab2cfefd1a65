//! Error types for the execution engine.

use crucible_protocol::{ExecutionOutcome, FailureKind};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the execution engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Browser engine could not be started. Fatal to the context manager;
    /// surfaced to the operator and never retried automatically.
    #[error("failed to launch browser engine: {0}")]
    Launch(String),

    /// Isolated context or page creation failed. Surfaced per request; the
    /// engine instance itself remains usable.
    #[error("failed to open isolated session: {0}")]
    Session(String),

    /// The submitted script threw, rejected, or was refused by the engine.
    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    /// The script exceeded its execution bound.
    #[error("script exceeded execution bound of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request was cancelled before or during execution.
    #[error("execution cancelled")]
    Cancelled,

    /// A session was requested before the browser engine was started.
    #[error("browser engine not started")]
    NotStarted,

    /// The dispatcher is no longer accepting work.
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Maps an error onto the caller-visible failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Launch(_) => FailureKind::Launch,
            Error::Session(_) | Error::NotStarted => FailureKind::Session,
            Error::Evaluation(_) => FailureKind::Evaluation,
            Error::Timeout { .. } => FailureKind::Timeout,
            Error::Cancelled | Error::ShuttingDown => FailureKind::Cancelled,
        }
    }

    /// Returns true if this error represents an exceeded execution bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<Error> for ExecutionOutcome {
    fn from(err: Error) -> Self {
        ExecutionOutcome::failure(err.failure_kind(), err.to_string())
    }
}
