use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contracts::{ActionRequest, AuditRecord};
use crate::errors::{AuditError, ExecutorError};

/// Resource limits an executor declares for the payloads it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorLimits {
    pub timeout: Duration,
    pub max_payload_bytes: usize,
    pub max_depth: usize,
    pub max_list_len: usize,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_payload_bytes: 10_000,
            max_depth: 10,
            max_list_len: 100,
        }
    }
}

/// A versioned, capability-describing action implementation.
///
/// `version` and `capabilities` return `None` when the executor does not
/// declare them at all, which is distinct from declaring an empty set.
pub trait Executor: Send + Sync {
    fn id(&self) -> &str;
    fn version(&self) -> Option<&str>;
    fn capabilities(&self) -> Option<&[String]>;
    fn limits(&self) -> &ExecutorLimits;
    fn execute(&self, request: &ActionRequest) -> Result<Option<Value>, ExecutorError>;
}

/// Append-only sink for audit records. Appends are fail-closed: an error
/// must mean the record is not durably stored.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}
