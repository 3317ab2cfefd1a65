//! Execution requests and their correlation ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Opaque token correlating an outcome with its originating request.
///
/// Callers may choose their own ids; [`RequestId::generate`] produces ids
/// unique within this process for callers that do not care.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns a fresh process-unique id.
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(format!("job-{}-{seq}", std::process::id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One script execution job as submitted by a caller.
///
/// Immutable once created; the id stays unique for the lifetime of the
/// request and is the only thing a caller needs to retain to correlate the
/// eventual outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub id: RequestId,
    /// Untrusted script payload, passed to the engine as opaque data.
    pub script: String,
    pub submitted_at: SystemTime,
}

impl ExecutionRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self::with_id(RequestId::generate(), script)
    }

    pub fn with_id(id: RequestId, script: impl Into<String>) -> Self {
        Self {
            id,
            script: script.into(),
            submitted_at: SystemTime::now(),
        }
    }
}
