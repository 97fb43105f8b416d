use std::sync::Arc;

use tracing::error;
use warden_core::config::GovernanceConfig;
use warden_core::contracts::{ActionResult, AuditRecord, DecisionRecord};
use warden_core::errors::AuditError;
use warden_core::traits::AuditSink;

use super::jsonl::JsonlAuditSink;

/// The decision-level and action-level sinks. They may be the same sink.
#[derive(Clone)]
pub struct AuditTrail {
    decisions: Arc<dyn AuditSink>,
    actions: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(decisions: Arc<dyn AuditSink>, actions: Arc<dyn AuditSink>) -> Self {
        Self { decisions, actions }
    }

    pub fn single(sink: Arc<dyn AuditSink>) -> Self {
        Self::new(sink.clone(), sink)
    }

    /// JSONL sinks at the configured paths; one shared sink when both paths match.
    pub fn from_config(config: &GovernanceConfig) -> Self {
        let decisions = Arc::new(JsonlAuditSink::new(&config.audit_log_path));
        if config.action_audit_path() == &config.audit_log_path {
            Self::single(decisions)
        } else {
            Self::new(decisions, Arc::new(JsonlAuditSink::new(config.action_audit_path())))
        }
    }

    pub fn record_decision(&self, record: &DecisionRecord) -> Result<(), AuditError> {
        self.decisions
            .append(&AuditRecord::DecisionAudit(record.clone()))
            .inspect_err(|e| error!(trace_id = %record.trace_id, error = %e, "decision audit write failed"))
    }

    pub fn record_action(&self, result: &ActionResult) -> Result<(), AuditError> {
        self.actions
            .append(&AuditRecord::ActionAudit(result.clone()))
            .inspect_err(|e| error!(trace_id = %result.trace_id(), error = %e, "action audit write failed"))
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("shared", &Arc::ptr_eq(&self.decisions, &self.actions))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use warden_core::contracts::Attribution;
    use warden_core::reasons::ReasonCode;
    use warden_core::types::TraceId;

    #[test]
    fn routes_records_to_their_sinks() {
        let decisions = Arc::new(MemoryAuditSink::new());
        let actions = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::new(decisions.clone(), actions.clone());

        let a = Attribution::new("process", TraceId::generate());
        trail.record_action(&ActionResult::pending(&a)).unwrap();
        assert!(decisions.is_empty());
        assert_eq!(actions.records()[0].event_type(), "action_audit");
    }

    #[test]
    fn shared_file_when_paths_match() {
        let dir = tempfile::tempdir().unwrap();
        let config = GovernanceConfig {
            audit_log_path: dir.path().join("audit.log"),
            ..GovernanceConfig::default()
        };
        let trail = AuditTrail::from_config(&config);
        let a = Attribution::new("noop", TraceId::generate());
        trail.record_action(&ActionResult::pending(&a)).unwrap();
        trail.record_action(&ActionResult::blocked(&a, ReasonCode::LimitExceeded)).unwrap();
        assert_eq!(crate::audit::verify_chain(&config.audit_log_path).unwrap().entries, 2);
    }
}
