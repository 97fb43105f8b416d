use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use warden_core::config::GovernanceConfig;
use warden_core::contracts::{ActionResult, DecisionRecord, GateInput, GateResult};
use warden_core::errors::{AuditError, ContractError};
use warden_core::types::TraceId;
use warden_digest::sha256_object;

use crate::audit::AuditTrail;
use crate::executors::builtin_registry;
use crate::pipeline::GovernedPipeline;
use crate::policy::{PolicyCatalog, PolicyGate};
use crate::registry::ActionRegistry;
use crate::resilience::ResilienceLayer;

#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    #[error("decision audit failed: {0}")]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Outcome of one governed submission. `action` is `None` when the gate denied.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub gate: GateResult,
    pub decision: DecisionRecord,
    pub action: Option<ActionResult>,
}

/// Gate -> decision audit -> pipeline.
pub struct Governor {
    gate: PolicyGate,
    pipeline: GovernedPipeline,
}

impl Governor {
    pub fn new(gate: PolicyGate, pipeline: GovernedPipeline) -> Self {
        Self { gate, pipeline }
    }

    /// Built-in registries and executors, JSONL audit sinks and resilience
    /// settings taken from `config`.
    pub fn from_config(config: &GovernanceConfig, catalog: PolicyCatalog) -> Self {
        let resilience = Arc::new(ResilienceLayer::from_config(config));
        let pipeline = GovernedPipeline::new(
            Arc::new(ActionRegistry::builtin()),
            Arc::new(builtin_registry(resilience)),
            AuditTrail::from_config(config),
        )
        .with_timeout(config.executor_timeout);
        Self::new(PolicyGate::new(catalog), pipeline)
    }

    pub fn gate(&self) -> &PolicyGate {
        &self.gate
    }

    pub fn pipeline(&self) -> &GovernedPipeline {
        &self.pipeline
    }

    /// Evaluate the gate and durably record the decision.
    pub fn decide(&self, input: &GateInput, trace_id: &TraceId) -> Result<(GateResult, DecisionRecord), GovernorError> {
        let gate = self.gate.evaluate(input);
        let record = DecisionRecord::new(&gate, Some(sha256_object(&input.payload)), trace_id.clone())?;
        self.pipeline.audit().record_decision(&record)?;
        Ok((gate, record))
    }

    /// Full submission. Nothing executes unless the ALLOW decision was recorded.
    pub fn submit(&self, input: &GateInput, trace_id: TraceId) -> Result<Submission, GovernorError> {
        let (gate, decision) = self.decide(input, &trace_id)?;
        let action = if gate.is_allow() {
            Some(self.pipeline.run(&input.action, &input.payload, trace_id))
        } else {
            info!(trace_id = %trace_id, action = %input.action, "submission denied by gate");
            None
        };
        Ok(Submission { gate, decision, action })
    }
}
