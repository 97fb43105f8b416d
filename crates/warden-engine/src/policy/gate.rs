use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use warden_core::contracts::{GateInput, GateReason, GateResult};
use warden_core::reasons::ReasonCode;
use warden_core::types::Sha256Hex;

use super::catalog::{PolicyCatalog, PolicyProfile};
use super::rules::{Rule, RuleOutcome, DEFAULT_RULES};

pub const MATCHED_UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
pub const MATCHED_RULE_EXCEPTION: &str = "RULE_EXCEPTION";

/// Deterministic, fail-closed ALLOW/DENY gate.
///
/// Evaluation order:
/// 1. Resolve the profile for the action (absent => DENY `UNKNOWN_ACTION`)
/// 2. Run rules in order, stopping at the first deny
/// 3. A rule error or panic => DENY `RULE_EXCEPTION_FAIL_CLOSED`
///
/// The catalog fingerprint is attached to every result, DENY included.
pub struct PolicyGate {
    catalog: RwLock<Arc<PolicyCatalog>>,
    rules: Vec<Rule>,
}

impl PolicyGate {
    pub fn new(catalog: PolicyCatalog) -> Self {
        Self::with_rules(catalog, DEFAULT_RULES.to_vec())
    }

    pub fn with_rules(catalog: PolicyCatalog, rules: Vec<Rule>) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            rules,
        }
    }

    /// Snapshot of the catalog currently in force.
    pub fn catalog(&self) -> Arc<PolicyCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Administrative swap; in-flight evaluations keep their snapshot.
    pub fn replace_catalog(&self, catalog: PolicyCatalog) -> Arc<PolicyCatalog> {
        let mut guard = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(
            target: "gate_audit",
            old = %guard.fingerprint(),
            new = %catalog.fingerprint(),
            "policy catalog replaced"
        );
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    pub fn evaluate(&self, input: &GateInput) -> GateResult {
        let catalog = self.catalog();
        let result = self.evaluate_with(&catalog, input);
        tracing::info!(
            target: "gate_audit",
            action = %input.action,
            decision = %result.decision,
            matched_rules = ?result.matched_rules,
            profile_hash = %result.profile_hash,
            "gate evaluated"
        );
        result
    }

    fn evaluate_with(&self, catalog: &PolicyCatalog, input: &GateInput) -> GateResult {
        let profile_hash = catalog.fingerprint().clone();
        let mut evaluated_keys: Vec<String> = Vec::new();

        let Some(profile) = catalog.get(&input.action) else {
            let reason = GateReason::new(ReasonCode::UnknownAction, "Action is not recognized.")
                .with_evidence("action", input.action.as_str());
            return deny(input, reason, evaluated_keys, profile_hash, MATCHED_UNKNOWN_ACTION);
        };

        for rule in &self.rules {
            let outcome = match run_rule(rule, input, profile) {
                Ok(outcome) => outcome,
                Err(detail) => {
                    tracing::warn!(
                        target: "gate_audit",
                        rule = rule.name,
                        action = %input.action,
                        "rule failed, denying"
                    );
                    let reason = GateReason::new(
                        ReasonCode::RuleExceptionFailClosed,
                        "Exception during rule evaluation; fail-closed.",
                    )
                    .with_evidence("exception", detail)
                    .with_evidence("profile", profile.name.as_str())
                    .with_evidence("rule", rule.name);
                    return deny(input, reason, evaluated_keys, profile_hash, MATCHED_RULE_EXCEPTION);
                }
            };
            match outcome {
                RuleOutcome::Pass { touched } => merge_keys(&mut evaluated_keys, touched),
                RuleOutcome::Deny { reason, touched } => {
                    merge_keys(&mut evaluated_keys, touched);
                    return deny(input, reason, evaluated_keys, profile_hash, rule.name);
                }
            }
        }

        let ok = GateReason::new(ReasonCode::Ok, "Gate passed.")
            .with_evidence("action", input.action.as_str())
            .with_evidence("profile", profile.name.as_str());
        GateResult::allow(ok, input.action.as_str(), evaluated_keys, profile_hash)
    }
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new(PolicyCatalog::builtin())
    }
}

/// Run one rule, folding both `Err` and panics into an error description.
fn run_rule(rule: &Rule, input: &GateInput, profile: &PolicyProfile) -> Result<RuleOutcome, String> {
    match catch_unwind(AssertUnwindSafe(|| (rule.check)(input, profile))) {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("panic".to_string()),
    }
}

fn merge_keys(acc: &mut Vec<String>, touched: Vec<String>) {
    for key in touched {
        if !acc.contains(&key) {
            acc.push(key);
        }
    }
}

fn deny(
    input: &GateInput,
    reason: GateReason,
    evaluated_keys: Vec<String>,
    profile_hash: Sha256Hex,
    matched: &str,
) -> GateResult {
    GateResult::deny(reason, input.action.as_str(), evaluated_keys, profile_hash, matched)
}
