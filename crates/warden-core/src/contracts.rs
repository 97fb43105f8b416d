//! Request, decision, and proof-of-execution contracts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ContractError, Decision};
use crate::reasons::ReasonCode;
use crate::types::{ActionStatus, Sha256Hex, TraceId};

/// Executor id/version recorded before an executor has been resolved.
pub const UNKNOWN: &str = "unknown";

/// A request evaluated by the policy gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateInput {
    pub action: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub allow_external: bool,
    #[serde(default = "default_true")]
    pub deny_unknown_fields: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl GateInput {
    /// Strict defaults: external fields refused, unknown fields denied.
    pub fn new(action: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            payload,
            allow_external: false,
            deny_unknown_fields: true,
            request_id: None,
            at: Utc::now(),
        }
    }

    pub fn allow_external(mut self, allow: bool) -> Self {
        self.allow_external = allow;
        self
    }

    pub fn deny_unknown_fields(mut self, deny: bool) -> Self {
        self.deny_unknown_fields = deny;
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReason {
    pub code: ReasonCode,
    pub message: String,
    #[serde(default)]
    pub evidence: Map<String, Value>,
}

impl GateReason {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            evidence: Map::new(),
        }
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub decision: Decision,
    pub reasons: Vec<GateReason>,
    pub action: String,
    /// Union of payload keys touched by every rule that ran, in first-touched order.
    pub evaluated_keys: Vec<String>,
    /// Fingerprint of the whole policy catalog; present on DENY too.
    pub profile_hash: Sha256Hex,
    /// Rules (or pseudo-rules) that produced a DENY; empty on ALLOW.
    pub matched_rules: Vec<String>,
    pub at: DateTime<Utc>,
}

impl GateResult {
    /// ALLOW carrying its single `OK` reason; no rules matched.
    pub fn allow(
        reason: GateReason,
        action: impl Into<String>,
        evaluated_keys: Vec<String>,
        profile_hash: Sha256Hex,
    ) -> Self {
        Self::build(Decision::Allow, vec![reason], action.into(), evaluated_keys, profile_hash, Vec::new())
    }

    /// DENY for `reason`, attributed to the rule (or pseudo-rule) `matched`.
    pub fn deny(
        reason: GateReason,
        action: impl Into<String>,
        evaluated_keys: Vec<String>,
        profile_hash: Sha256Hex,
        matched: impl Into<String>,
    ) -> Self {
        Self::build(
            Decision::Deny,
            vec![reason],
            action.into(),
            evaluated_keys,
            profile_hash,
            vec![matched.into()],
        )
    }

    pub fn new(
        decision: Decision,
        reasons: Vec<GateReason>,
        action: impl Into<String>,
        evaluated_keys: Vec<String>,
        profile_hash: Sha256Hex,
        matched_rules: Vec<String>,
    ) -> Result<Self, ContractError> {
        if decision == Decision::Deny && reasons.is_empty() {
            return Err(ContractError::DenyWithoutReason);
        }
        Ok(Self::build(decision, reasons, action.into(), evaluated_keys, profile_hash, matched_rules))
    }

    fn build(
        decision: Decision,
        reasons: Vec<GateReason>,
        action: String,
        evaluated_keys: Vec<String>,
        profile_hash: Sha256Hex,
        matched_rules: Vec<String>,
    ) -> Self {
        Self {
            decision,
            reasons,
            action,
            evaluated_keys,
            profile_hash,
            matched_rules,
            at: Utc::now(),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn reason_codes(&self) -> Vec<ReasonCode> {
        self.reasons.iter().map(|r| r.code).collect()
    }
}

/// Gate-level audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub profile_id: String,
    pub profile_hash: Sha256Hex,
    pub matched_rules: Vec<String>,
    pub reason_codes: Vec<ReasonCode>,
    pub input_digest: Option<Sha256Hex>,
    pub trace_id: TraceId,
    pub ts_utc: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        result: &GateResult,
        input_digest: Option<Sha256Hex>,
        trace_id: TraceId,
    ) -> Result<Self, ContractError> {
        let reason_codes: Vec<ReasonCode> = match result.decision {
            Decision::Deny => result.reason_codes(),
            Decision::Allow => Vec::new(),
        };
        if result.decision == Decision::Deny && reason_codes.is_empty() {
            return Err(ContractError::DenyWithoutReason);
        }
        Ok(Self {
            decision: result.decision,
            profile_id: result.action.clone(),
            profile_hash: result.profile_hash.clone(),
            matched_rules: result.matched_rules.clone(),
            reason_codes,
            input_digest,
            trace_id,
            ts_utc: Utc::now(),
        })
    }
}

/// Immutable request handed to an executor.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    pub action: String,
    pub payload: Map<String, Value>,
    pub trace_id: TraceId,
    pub ts_utc: DateTime<Utc>,
    /// Set by the pipeline when it stops waiting for the executor.
    #[serde(skip)]
    pub cancel: CancelToken,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, payload: Map<String, Value>, trace_id: TraceId) -> Self {
        Self {
            action: action.into(),
            payload,
            trace_id,
            ts_utc: Utc::now(),
            cancel: CancelToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One-way cancellation flag shared between a waiter and the work it waits on.
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Who and what an action result is about. Shared by every result the
/// pipeline emits for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub action: String,
    pub executor_id: String,
    pub executor_version: String,
    pub input_digest: Option<Sha256Hex>,
    pub trace_id: TraceId,
}

impl Attribution {
    pub fn new(action: impl Into<String>, trace_id: TraceId) -> Self {
        Self {
            action: action.into(),
            executor_id: UNKNOWN.to_string(),
            executor_version: UNKNOWN.to_string(),
            input_digest: None,
            trace_id,
        }
    }
}

/// Proof object for one execution outcome. Never carries the raw payload or
/// the raw output, only their digests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    action: String,
    executor_id: String,
    executor_version: String,
    status: ActionStatus,
    reason_codes: Vec<ReasonCode>,
    input_digest: Option<Sha256Hex>,
    output_digest: Option<Sha256Hex>,
    trace_id: TraceId,
    ts_utc: DateTime<Utc>,
}

impl ActionResult {
    pub fn new(
        attribution: &Attribution,
        status: ActionStatus,
        reason_codes: Vec<ReasonCode>,
        output_digest: Option<Sha256Hex>,
    ) -> Result<Self, ContractError> {
        if reason_codes.is_empty() && !status.allows_empty_reasons() {
            return Err(ContractError::MissingReasonCodes(status.to_string()));
        }
        Ok(Self::build(attribution, status, reason_codes, output_digest))
    }

    fn build(
        attribution: &Attribution,
        status: ActionStatus,
        reason_codes: Vec<ReasonCode>,
        output_digest: Option<Sha256Hex>,
    ) -> Self {
        Self {
            action: attribution.action.clone(),
            executor_id: attribution.executor_id.clone(),
            executor_version: attribution.executor_version.clone(),
            status,
            reason_codes,
            input_digest: attribution.input_digest.clone(),
            output_digest,
            trace_id: attribution.trace_id.clone(),
            ts_utc: Utc::now(),
        }
    }

    pub fn success(attribution: &Attribution, output_digest: Option<Sha256Hex>) -> Self {
        Self::build(attribution, ActionStatus::Success, Vec::new(), output_digest)
    }

    /// Pre-audit marker written before the executor is invoked.
    pub fn pending(attribution: &Attribution) -> Self {
        Self::build(
            attribution,
            ActionStatus::Pending,
            vec![ReasonCode::ExecutionAttempt],
            None,
        )
    }

    pub fn blocked(attribution: &Attribution, code: ReasonCode) -> Self {
        Self::build(attribution, ActionStatus::Blocked, vec![code], None)
    }

    pub fn failed(attribution: &Attribution, code: ReasonCode) -> Self {
        Self::build(attribution, ActionStatus::Failed, vec![code], None)
    }

    /// Same attribution and output digest, status forced to BLOCKED.
    pub fn downgraded(&self, code: ReasonCode) -> Self {
        Self {
            status: ActionStatus::Blocked,
            reason_codes: vec![code],
            ts_utc: Utc::now(),
            ..self.clone()
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    pub fn executor_version(&self) -> &str {
        &self.executor_version
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn reason_codes(&self) -> &[ReasonCode] {
        &self.reason_codes
    }

    pub fn input_digest(&self) -> Option<&Sha256Hex> {
        self.input_digest.as_ref()
    }

    pub fn output_digest(&self) -> Option<&Sha256Hex> {
        self.output_digest.as_ref()
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    pub fn ts_utc(&self) -> DateTime<Utc> {
        self.ts_utc
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

/// One line of the audit log. `event_type` discriminates the two record kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditRecord {
    DecisionAudit(DecisionRecord),
    ActionAudit(ActionResult),
}

impl AuditRecord {
    pub fn trace_id(&self) -> &TraceId {
        match self {
            AuditRecord::DecisionAudit(r) => &r.trace_id,
            AuditRecord::ActionAudit(r) => r.trace_id(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AuditRecord::DecisionAudit(_) => "decision_audit",
            AuditRecord::ActionAudit(_) => "action_audit",
        }
    }
}
