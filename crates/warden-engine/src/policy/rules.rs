//! Gate rules: pure functions over (input, profile) returning a tagged outcome.

use std::collections::BTreeSet;

use serde_json::json;
use warden_core::contracts::{GateInput, GateReason};
use warden_core::errors::RuleError;
use warden_core::reasons::ReasonCode;

use super::catalog::PolicyProfile;

/// Administrative key names refused for every action.
pub const FORBIDDEN_ADMIN_KEYS_BASELINE: [&str; 5] =
    ["admin_signal", "admin", "root", "override", "system_prompt"];

/// Payload keys marking data that originated outside the system.
pub const EXTERNAL_FIELDS: [&str; 2] = ["external_id", "external_source"];

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Pass { touched: Vec<String> },
    Deny { reason: GateReason, touched: Vec<String> },
}

pub type RuleFn = fn(&GateInput, &PolicyProfile) -> Result<RuleOutcome, RuleError>;

#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub check: RuleFn,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

pub const DEFAULT_RULES: [Rule; 3] = [
    Rule {
        name: "forbidden_admin_keys",
        check: forbidden_admin_keys,
    },
    Rule {
        name: "external_fields_policy",
        check: external_fields_policy,
    },
    Rule {
        name: "unknown_fields_fail_closed",
        check: unknown_fields_fail_closed,
    },
];

/// Both the caller and the profile must allow external fields.
pub fn effective_allow_external(input: &GateInput, profile: &PolicyProfile) -> bool {
    input.allow_external && profile.allow_external
}

/// Either the caller or the profile can force unknown-field denial.
pub fn effective_deny_unknown_fields(input: &GateInput, profile: &PolicyProfile) -> bool {
    input.deny_unknown_fields || profile.deny_unknown_fields
}

pub fn forbidden_admin_keys(
    input: &GateInput,
    profile: &PolicyProfile,
) -> Result<RuleOutcome, RuleError> {
    let hit: Vec<String> = input
        .payload
        .keys()
        .filter(|k| {
            FORBIDDEN_ADMIN_KEYS_BASELINE.contains(&k.as_str()) || profile.forbidden_keys.contains(*k)
        })
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if hit.is_empty() {
        return Ok(RuleOutcome::Pass { touched: vec![] });
    }
    let reason = GateReason::new(
        ReasonCode::AdminSignalForbidden,
        "Administrative keys are forbidden.",
    )
    .with_evidence("keys", json!(hit))
    .with_evidence("profile", profile.name.as_str());
    Ok(RuleOutcome::Deny {
        reason,
        touched: hit,
    })
}

pub fn external_fields_policy(
    input: &GateInput,
    profile: &PolicyProfile,
) -> Result<RuleOutcome, RuleError> {
    let present: Vec<String> = EXTERNAL_FIELDS
        .iter()
        .filter(|k| input.payload.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    if present.is_empty() || effective_allow_external(input, profile) {
        return Ok(RuleOutcome::Pass { touched: present });
    }
    let reason = GateReason::new(
        ReasonCode::ExternalFieldsNotAllowed,
        "External fields not allowed by policy.",
    )
    .with_evidence("present", json!(present))
    .with_evidence("profile", profile.name.as_str())
    .with_evidence("effective_allow_external", false);
    Ok(RuleOutcome::Deny {
        reason,
        touched: present,
    })
}

pub fn unknown_fields_fail_closed(
    input: &GateInput,
    profile: &PolicyProfile,
) -> Result<RuleOutcome, RuleError> {
    let keys: BTreeSet<&String> = input.payload.keys().collect();
    let unknown: Vec<String> = keys
        .iter()
        .filter(|k| !profile.allowlist.contains(**k))
        .map(|k| k.to_string())
        .collect();
    if unknown.is_empty() || !effective_deny_unknown_fields(input, profile) {
        return Ok(RuleOutcome::Pass {
            touched: keys.into_iter().cloned().collect(),
        });
    }
    let reason = GateReason::new(
        ReasonCode::UnknownFieldsPresent,
        "Unknown fields present (fail-closed).",
    )
    .with_evidence("unknown", json!(unknown))
    .with_evidence("profile", profile.name.as_str())
    .with_evidence("effective_deny_unknown_fields", true);
    Ok(RuleOutcome::Deny {
        reason,
        touched: unknown,
    })
}
