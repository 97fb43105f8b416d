use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reason-code taxonomy shared by the gate and the governed pipeline.
///
/// Codes are outcomes, not error types: every internal fault is converted into
/// one of these at the boundary of the component that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    // gate
    Ok,
    UnknownAction,
    AdminSignalForbidden,
    ExternalFieldsNotAllowed,
    UnknownFieldsPresent,
    RuleExceptionFailClosed,
    // pipeline
    NonJsonPayload,
    ActionUnknown,
    ActionVersionMissing,
    ActionVersionInvalid,
    ExecutorNotFound,
    ExecutorVersionMissing,
    ExecutorVersionIncompatible,
    ExecutorCapabilityMissing,
    ExecutorCapabilityMismatch,
    LimitExceeded,
    AuditLogFailed,
    ExecutorTimeout,
    ExecutorException,
    ExecutionAttempt,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 20] = [
        ReasonCode::Ok,
        ReasonCode::UnknownAction,
        ReasonCode::AdminSignalForbidden,
        ReasonCode::ExternalFieldsNotAllowed,
        ReasonCode::UnknownFieldsPresent,
        ReasonCode::RuleExceptionFailClosed,
        ReasonCode::NonJsonPayload,
        ReasonCode::ActionUnknown,
        ReasonCode::ActionVersionMissing,
        ReasonCode::ActionVersionInvalid,
        ReasonCode::ExecutorNotFound,
        ReasonCode::ExecutorVersionMissing,
        ReasonCode::ExecutorVersionIncompatible,
        ReasonCode::ExecutorCapabilityMissing,
        ReasonCode::ExecutorCapabilityMismatch,
        ReasonCode::LimitExceeded,
        ReasonCode::AuditLogFailed,
        ReasonCode::ExecutorTimeout,
        ReasonCode::ExecutorException,
        ReasonCode::ExecutionAttempt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Ok => "OK",
            ReasonCode::UnknownAction => "UNKNOWN_ACTION",
            ReasonCode::AdminSignalForbidden => "ADMIN_SIGNAL_FORBIDDEN",
            ReasonCode::ExternalFieldsNotAllowed => "EXTERNAL_FIELDS_NOT_ALLOWED",
            ReasonCode::UnknownFieldsPresent => "UNKNOWN_FIELDS_PRESENT",
            ReasonCode::RuleExceptionFailClosed => "RULE_EXCEPTION_FAIL_CLOSED",
            ReasonCode::NonJsonPayload => "NON_JSON_PAYLOAD",
            ReasonCode::ActionUnknown => "ACTION_UNKNOWN",
            ReasonCode::ActionVersionMissing => "ACTION_VERSION_MISSING",
            ReasonCode::ActionVersionInvalid => "ACTION_VERSION_INVALID",
            ReasonCode::ExecutorNotFound => "EXECUTOR_NOT_FOUND",
            ReasonCode::ExecutorVersionMissing => "EXECUTOR_VERSION_MISSING",
            ReasonCode::ExecutorVersionIncompatible => "EXECUTOR_VERSION_INCOMPATIBLE",
            ReasonCode::ExecutorCapabilityMissing => "EXECUTOR_CAPABILITY_MISSING",
            ReasonCode::ExecutorCapabilityMismatch => "EXECUTOR_CAPABILITY_MISMATCH",
            ReasonCode::LimitExceeded => "LIMIT_EXCEEDED",
            ReasonCode::AuditLogFailed => "AUDIT_LOG_FAILED",
            ReasonCode::ExecutorTimeout => "EXECUTOR_TIMEOUT",
            ReasonCode::ExecutorException => "EXECUTOR_EXCEPTION",
            ReasonCode::ExecutionAttempt => "EXECUTION_ATTEMPT",
        }
    }

    /// True for codes the policy gate can emit.
    pub fn is_gate_code(self) -> bool {
        matches!(
            self,
            ReasonCode::Ok
                | ReasonCode::UnknownAction
                | ReasonCode::AdminSignalForbidden
                | ReasonCode::ExternalFieldsNotAllowed
                | ReasonCode::UnknownFieldsPresent
                | ReasonCode::RuleExceptionFailClosed
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reason code: {0}")]
pub struct UnknownReasonCode(pub String);

impl FromStr for ReasonCode {
    type Err = UnknownReasonCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReasonCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownReasonCode(s.to_string()))
    }
}
