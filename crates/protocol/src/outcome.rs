//! Terminal outcomes and the failure taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classified cause of a failed execution, the only part of a failure a
/// caller should branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The browser engine could not be started.
    Launch,
    /// Context or page creation failed; the engine itself is still usable.
    Session,
    /// The script threw, rejected, or was refused by the engine.
    Evaluation,
    /// The script exceeded its execution bound.
    Timeout,
    /// The request was cancelled by the caller or by shutdown.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Launch => "launch",
            FailureKind::Session => "session",
            FailureKind::Evaluation => "evaluation",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal result of one execution request.
///
/// Produced exactly once per request: either the value the script resolved
/// to, or a classified failure. There is no partial or retried state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success { value: Value },
    Failure { kind: FailureKind, message: String },
}

impl ExecutionOutcome {
    pub fn success(value: Value) -> Self {
        ExecutionOutcome::Success { value }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ExecutionOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Returns the failure kind, if this outcome is a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_wire_shape() {
        let outcome = ExecutionOutcome::success(json!(2));
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(wire, json!({ "status": "success", "value": 2 }));
    }

    #[test]
    fn failure_wire_shape() {
        let outcome = ExecutionOutcome::failure(FailureKind::Evaluation, "Error: x");
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            wire,
            json!({ "status": "failure", "kind": "evaluation", "message": "Error: x" })
        );
    }
}
