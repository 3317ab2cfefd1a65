//! Tagged job messages exchanged with the daemon, one JSON object per line.

use serde::{Deserialize, Serialize};

use crate::outcome::ExecutionOutcome;

/// Inbound messages accepted by the daemon.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobRequest {
    Ping,
    /// Execute a script payload in a disposable isolated context.
    Execute {
        script: String,
        /// Caller-chosen correlation id; generated when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Cancel a queued or running request by id.
    Cancel { id: String },
    Status,
    Shutdown,
}

/// Outbound replies, each correlated to one inbound message (outcomes carry
/// the request id and may arrive out of submission order).
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResponse {
    Pong,
    Outcome {
        id: String,
        #[serde(flatten)]
        outcome: ExecutionOutcome,
    },
    Status {
        queued: usize,
        running: usize,
        completed: u64,
        failed: u64,
    },
    Ok,
    Error {
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_message_wire_shape() {
        let request: JobRequest =
            serde_json::from_value(json!({ "type": "execute", "script": "1+1" })).unwrap();
        match request {
            JobRequest::Execute { script, id } => {
                assert_eq!(script, "1+1");
                assert!(id.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn outcome_response_flattens_status_fields() {
        let response = JobResponse::Outcome {
            id: "job-1".to_string(),
            outcome: ExecutionOutcome::success(json!(2)),
        };
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(
            wire,
            json!({ "type": "outcome", "id": "job-1", "status": "success", "value": 2 })
        );
    }

    #[test]
    fn outcome_response_round_trips() {
        let line = r#"{"type":"outcome","id":"a","status":"failure","kind":"timeout","message":"script exceeded execution bound of 100ms"}"#;
        let response: JobResponse = serde_json::from_str(line).unwrap();
        match response {
            JobResponse::Outcome { id, outcome } => {
                assert_eq!(id, "a");
                assert!(!outcome.is_success());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
