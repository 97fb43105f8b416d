use std::fmt;
use std::time::Duration;

/// Gate-level decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Violations of contract invariants on construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("invalid trace id: {0:?}")]
    InvalidTraceId(String),
    #[error("invalid sha256 digest: {0:?}")]
    InvalidDigest(String),
    #[error("status {0} requires at least one reason code")]
    MissingReasonCodes(String),
    #[error("DENY decision requires at least one reason code")]
    DenyWithoutReason,
    #[error("invalid field {field}: {message}")]
    InvalidField { field: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("write failure: {0}")]
    WriteFailure(String),
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("chain corruption at entry {0}")]
    ChainCorruption(u64),
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::WriteFailure(err.to_string())
    }
}

/// Failures raised by an executor. The pipeline maps every variant to a
/// typed `FAILED` outcome; none of them cross the pipeline boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    #[error("provider failure: {0}")]
    Provider(String),
    #[error("execution failed: {0}")]
    Failed(String),
    /// The caller stopped waiting; remaining work was skipped.
    #[error("execution cancelled")]
    Cancelled,
}

/// Failures reported by an external text-generation provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {0} timed out")]
    Timeout(String),
    #[error("provider {0} rate limited the request")]
    RateLimited(String),
    #[error("provider {0} unavailable: {1}")]
    Unavailable(String, String),
    #[error("provider {0} rejected the request: {1}")]
    Rejected(String, String),
}

impl ProviderError {
    /// Transient failures are worth retrying; rejections are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProviderError::Rejected(..))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate entry: {0}")]
    Duplicate(String),
    #[error("invalid entry {id}: {message}")]
    Invalid { id: String, message: String },
}

/// Error raised inside a gate rule; the gate converts it into a fail-closed DENY.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule {rule} failed: {message}")]
pub struct RuleError {
    pub rule: String,
    pub message: String,
}
