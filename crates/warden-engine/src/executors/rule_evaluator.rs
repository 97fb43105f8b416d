//! Deterministic evaluation of `{field, op, value}` rules against an input object.
//!
//! The payload schema is strict: exactly `rules` (non-empty list) and `input`
//! (object); every rule has exactly `field`, `op` and `value`, the field must
//! exist in `input`, ordering operators need numbers on both sides, and
//! equality operators need the same JSON type. No coercion.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};
use warden_core::contracts::ActionRequest;
use warden_core::errors::ExecutorError;
use warden_core::traits::{Executor, ExecutorLimits};

use crate::registry::router::EXECUTOR_RULE_EVALUATOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "==" => Op::Eq,
            "!=" => Op::Neq,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            _ => return None,
        })
    }

    fn is_ordering(self) -> bool {
        !matches!(self, Op::Eq | Op::Neq)
    }
}

#[derive(Default)]
pub struct RuleEvaluatorExecutor {
    capabilities: Vec<String>,
    limits: ExecutorLimits,
}

impl RuleEvaluatorExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn invalid() -> ExecutorError {
    ExecutorError::InvalidPayload("INVALID_PAYLOAD".into())
}

fn same_type(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.is_f64() == y.is_f64(),
        _ => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

struct Check<'a> {
    rule: &'a Value,
    field: &'a str,
    op: Op,
    value: &'a Value,
}

fn validate(payload: &Map<String, Value>) -> Result<(Vec<Check<'_>>, &Map<String, Value>), ExecutorError> {
    if payload.len() != 2 {
        return Err(invalid());
    }
    let rules = match payload.get("rules") {
        Some(Value::Array(rules)) if !rules.is_empty() => rules,
        _ => return Err(invalid()),
    };
    let input = payload.get("input").and_then(Value::as_object).ok_or_else(invalid)?;

    let mut checks = Vec::with_capacity(rules.len());
    for rule in rules {
        let obj = rule.as_object().ok_or_else(invalid)?;
        if obj.len() != 3 {
            return Err(invalid());
        }
        let field = obj.get("field").and_then(Value::as_str).ok_or_else(invalid)?;
        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .and_then(Op::parse)
            .ok_or_else(invalid)?;
        let value = obj.get("value").ok_or_else(invalid)?;
        let actual = input.get(field).ok_or_else(invalid)?;
        let typed = if op.is_ordering() {
            actual.is_number() && value.is_number()
        } else {
            same_type(actual, value)
        };
        if !typed {
            return Err(invalid());
        }
        checks.push(Check {
            rule,
            field,
            op,
            value,
        });
    }
    Ok((checks, input))
}

fn holds(check: &Check<'_>, input: &Map<String, Value>) -> bool {
    let Some(actual) = input.get(check.field) else {
        return false;
    };
    if !check.op.is_ordering() {
        let eq = actual == check.value;
        return if check.op == Op::Eq { eq } else { !eq };
    }
    let (Some(a), Some(b)) = (actual.as_f64(), check.value.as_f64()) else {
        return false;
    };
    let Some(ord) = a.partial_cmp(&b) else {
        return false;
    };
    match check.op {
        Op::Gt => ord == Ordering::Greater,
        Op::Gte => ord != Ordering::Less,
        Op::Lt => ord == Ordering::Less,
        Op::Lte => ord != Ordering::Greater,
        Op::Eq | Op::Neq => false,
    }
}

impl Executor for RuleEvaluatorExecutor {
    fn id(&self) -> &str {
        EXECUTOR_RULE_EVALUATOR
    }

    fn version(&self) -> Option<&str> {
        Some("1.0.0")
    }

    fn capabilities(&self) -> Option<&[String]> {
        Some(&self.capabilities)
    }

    fn limits(&self) -> &ExecutorLimits {
        &self.limits
    }

    fn execute(&self, request: &ActionRequest) -> Result<Option<Value>, ExecutorError> {
        let (checks, input) = validate(&request.payload)?;
        let matches: Vec<&Value> = checks
            .iter()
            .filter(|c| holds(c, input))
            .map(|c| c.rule)
            .collect();
        Ok(Some(json!({ "matched": !matches.is_empty(), "matches": matches })))
    }
}
