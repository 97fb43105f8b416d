use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use warden_core::capabilities;
use warden_core::errors::RegistryError;
use warden_core::semver;
use warden_core::types::Sha256Hex;
use warden_digest::sha256_value;

use super::router::{EXECUTOR_LLM, EXECUTOR_NOOP, EXECUTOR_RULE_EVALUATOR, EXECUTOR_TEXT_PROCESS};
use crate::policy::catalog::{ACTION_LLM_GENERATE, ACTION_NOOP, ACTION_PROCESS, ACTION_RULE_EVALUATE};

pub const CAP_TEXT_PROCESSING: &str = "TEXT_PROCESSING";
pub const CAP_TEXT_GENERATION: &str = "TEXT_GENERATION";

/// Actions exempt from version and capability enforcement.
pub const LEGACY_ACTIONS: [&str; 2] = [ACTION_NOOP, ACTION_RULE_EVALUATE];

/// Governance metadata for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMeta {
    pub description: String,
    pub executor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_version: Option<String>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_executor_version: Option<String>,
}

impl ActionMeta {
    pub fn new(description: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            executor: executor.into(),
            action_version: None,
            required_capabilities: Vec::new(),
            min_executor_version: None,
        }
    }

    pub fn action_version(mut self, version: impl Into<String>) -> Self {
        self.action_version = Some(version.into());
        self
    }

    pub fn required_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_capabilities = capabilities::normalize(caps);
        self
    }

    pub fn min_executor_version(mut self, version: impl Into<String>) -> Self {
        self.min_executor_version = Some(version.into());
        self
    }

    fn validate(&self, action: &str) -> Result<(), RegistryError> {
        let invalid = |message: String| RegistryError::Invalid {
            id: action.to_string(),
            message,
        };
        if self.executor.trim().is_empty() {
            return Err(invalid("empty executor id".into()));
        }
        if let Some(v) = &self.min_executor_version {
            if !semver::is_valid(v) {
                return Err(invalid(format!("min_executor_version {v:?} is not X.Y.Z")));
            }
        }
        Ok(())
    }
}

/// Action id -> metadata table. Read-mostly; mutation is an administrative path.
#[derive(Debug)]
pub struct ActionRegistry {
    actions: RwLock<Arc<BTreeMap<String, ActionMeta>>>,
    legacy: BTreeSet<String>,
}

impl ActionRegistry {
    pub fn new<I>(actions: I, legacy: &[&str]) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (String, ActionMeta)>,
    {
        let mut table = BTreeMap::new();
        for (action, mut meta) in actions {
            meta.required_capabilities = capabilities::normalize(&meta.required_capabilities);
            meta.validate(&action)?;
            if table.contains_key(&action) {
                return Err(RegistryError::Duplicate(action));
            }
            table.insert(action, meta);
        }
        Ok(Self {
            actions: RwLock::new(Arc::new(table)),
            legacy: legacy.iter().map(|a| a.to_string()).collect(),
        })
    }

    pub fn builtin() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            ACTION_PROCESS.to_string(),
            ActionMeta::new("Process text input", EXECUTOR_TEXT_PROCESS)
                .action_version("1.0.0")
                .required_capabilities([CAP_TEXT_PROCESSING])
                .min_executor_version("1.0.0"),
        );
        table.insert(
            ACTION_LLM_GENERATE.to_string(),
            ActionMeta::new("Generate text through a governed provider", EXECUTOR_LLM)
                .action_version("1.0.0")
                .required_capabilities([CAP_TEXT_GENERATION])
                .min_executor_version("1.0.0"),
        );
        table.insert(
            ACTION_NOOP.to_string(),
            ActionMeta::new("No operation", EXECUTOR_NOOP),
        );
        table.insert(
            ACTION_RULE_EVALUATE.to_string(),
            ActionMeta::new("Evaluate declarative rules against input", EXECUTOR_RULE_EVALUATOR),
        );
        Self {
            actions: RwLock::new(Arc::new(table)),
            legacy: LEGACY_ACTIONS.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn snapshot(&self) -> Arc<BTreeMap<String, ActionMeta>> {
        Arc::clone(&self.actions.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, action: &str) -> Option<ActionMeta> {
        self.snapshot().get(action).cloned()
    }

    pub fn is_legacy(&self, action: &str) -> bool {
        self.legacy.contains(action)
    }

    pub fn actions(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    /// Insert or replace one entry (administrative and test path).
    pub fn upsert(&self, action: &str, mut meta: ActionMeta) -> Result<Option<ActionMeta>, RegistryError> {
        meta.required_capabilities = capabilities::normalize(&meta.required_capabilities);
        meta.validate(action)?;
        let mut guard = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        let mut table = (**guard).clone();
        let previous = table.insert(action.to_string(), meta);
        *guard = Arc::new(table);
        tracing::info!(action, replaced = previous.is_some(), "action registry updated");
        Ok(previous)
    }

    pub fn remove(&self, action: &str) -> Option<ActionMeta> {
        let mut guard = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        let mut table = (**guard).clone();
        let previous = table.remove(action);
        *guard = Arc::new(table);
        previous
    }

    pub fn export(&self) -> Value {
        json!({
            "actions": *self.snapshot(),
            "legacy": self.legacy,
        })
    }

    /// SHA-256 of the canonical export; detects drift in the action table.
    pub fn fingerprint(&self) -> Sha256Hex {
        sha256_value(&self.export())
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
