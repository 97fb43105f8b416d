use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use warden_core::errors::RegistryError;
use warden_core::types::Sha256Hex;
use warden_digest::sha256_value;

use super::schema;

pub const ACTION_AGENT_RUN: &str = "AGENT.RUN";
pub const ACTION_ARCONTE_SIGNAL: &str = "ARCONTE.SIGNAL";
pub const ACTION_PROCESS: &str = "process";
pub const ACTION_NOOP: &str = "noop";
pub const ACTION_RULE_EVALUATE: &str = "rule_evaluate";
pub const ACTION_LLM_GENERATE: &str = "llm_generate";
pub const ACTION_PREFERENCES_GET: &str = "preferences.get";
pub const ACTION_PREFERENCES_PUT: &str = "preferences.put";
pub const ACTION_PREFERENCES_DELETE: &str = "preferences.delete";

/// Per-action payload policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyProfile {
    pub action: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub deny_unknown_fields: bool,
    #[serde(default)]
    pub allow_external: bool,
    pub allowlist: BTreeSet<String>,
    #[serde(default)]
    pub forbidden_keys: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

impl PolicyProfile {
    /// Strict profile: unknown fields denied, external fields refused.
    pub fn strict(action: &str, name: &str, allowlist: &[&str]) -> Self {
        Self {
            action: action.to_string(),
            name: name.to_string(),
            deny_unknown_fields: true,
            allow_external: false,
            allowlist: allowlist.iter().map(|k| k.to_string()).collect(),
            forbidden_keys: BTreeSet::new(),
        }
    }
}

/// Immutable, fingerprinted table of policy profiles keyed by action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyCatalog {
    profiles: BTreeMap<String, PolicyProfile>,
    fingerprint: Sha256Hex,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    profiles: Vec<PolicyProfile>,
}

impl PolicyCatalog {
    pub fn new(profiles: Vec<PolicyProfile>) -> Result<Self, RegistryError> {
        let mut table = BTreeMap::new();
        for profile in profiles {
            if profile.action.is_empty() {
                return Err(RegistryError::Invalid {
                    id: profile.name,
                    message: "empty action name".into(),
                });
            }
            if table.contains_key(&profile.action) {
                return Err(RegistryError::Duplicate(profile.action));
            }
            table.insert(profile.action.clone(), profile);
        }
        let fingerprint = sha256_value(&export_profiles(&table));
        Ok(Self {
            profiles: table,
            fingerprint,
        })
    }

    pub fn builtin() -> Self {
        let profiles = vec![
            PolicyProfile::strict(
                ACTION_AGENT_RUN,
                "agent_run.v1",
                &["agent_id", "task", "external_id", "external_source"],
            ),
            PolicyProfile::strict(
                ACTION_ARCONTE_SIGNAL,
                "arconte_signal.v1",
                &["signal", "external_id", "external_source"],
            ),
            PolicyProfile::strict(ACTION_PROCESS, "process.v1", &["text"]),
            PolicyProfile::strict(ACTION_NOOP, "noop.v1", &[]),
            PolicyProfile::strict(ACTION_RULE_EVALUATE, "rule_evaluate.v1", &["rules", "input"]),
            PolicyProfile::strict(
                ACTION_LLM_GENERATE,
                "llm_generate.v1",
                &["prompt", "model", "max_tokens"],
            ),
            PolicyProfile::strict(ACTION_PREFERENCES_GET, "preferences_get.v1", &["user_id"]),
            PolicyProfile::strict(
                ACTION_PREFERENCES_PUT,
                "preferences_put.v1",
                &["user_id", "tone_preference", "output_format", "language"],
            ),
            PolicyProfile::strict(
                ACTION_PREFERENCES_DELETE,
                "preferences_delete.v1",
                &["user_id"],
            ),
        ];
        // Built-in actions are distinct, so the fallback is unreachable.
        Self::new(profiles).unwrap_or_else(|_| Self::empty())
    }

    fn empty() -> Self {
        let profiles = BTreeMap::new();
        let fingerprint = sha256_value(&export_profiles(&profiles));
        Self {
            profiles,
            fingerprint,
        }
    }

    /// Parse and validate a catalog document (`{"profiles": [...]}`).
    pub fn from_json(text: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(text).context("catalog is not valid JSON")?;
        schema::validate_catalog(&data)?;
        let doc: CatalogDocument =
            serde_json::from_value(data).context("catalog does not match profile layout")?;
        Ok(Self::new(doc.profiles)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read catalog {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn get(&self, action: &str) -> Option<&PolicyProfile> {
        self.profiles.get(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// SHA-256 over the canonical export of the whole catalog.
    pub fn fingerprint(&self) -> &Sha256Hex {
        &self.fingerprint
    }

    /// Deterministic export: profiles sorted by action, key sets sorted.
    pub fn export(&self) -> Value {
        export_profiles(&self.profiles)
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn export_profiles(profiles: &BTreeMap<String, PolicyProfile>) -> Value {
    let items: Vec<Value> = profiles
        .values()
        .map(|p| {
            json!({
                "action": p.action,
                "name": p.name,
                "deny_unknown_fields": p.deny_unknown_fields,
                "allow_external": p.allow_external,
                "allowlist": p.allowlist,
                "forbidden_keys": p.forbidden_keys,
            })
        })
        .collect();
    json!({ "profiles": items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_digest::canonical_string;

    #[test]
    fn builtin_has_core_actions() {
        let c = PolicyCatalog::builtin();
        for action in [ACTION_AGENT_RUN, ACTION_PROCESS, ACTION_NOOP, ACTION_LLM_GENERATE] {
            assert!(c.get(action).is_some(), "{action} missing");
        }
        assert_eq!(c.len(), 9);
        assert!(c.get("nope").is_none());
    }

    #[test]
    fn export_is_sorted_and_fingerprinted() {
        let c = PolicyCatalog::builtin();
        let export = c.export();
        let actions: Vec<&str> = export["profiles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["action"].as_str().unwrap())
            .collect();
        let mut sorted = actions.clone();
        sorted.sort();
        assert_eq!(actions, sorted);
        assert_eq!(
            export["profiles"][0]["allowlist"],
            json!(["agent_id", "external_id", "external_source", "task"])
        );
        assert_eq!(c.fingerprint(), &sha256_value(&export));
        assert!(canonical_string(&export).starts_with("{\"profiles\":[{\"action\":\"AGENT.RUN\""));
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = PolicyProfile::strict("a", "a.v1", &["x", "y"]);
        let b = PolicyProfile::strict("b", "b.v1", &["z"]);
        let one = PolicyCatalog::new(vec![a.clone(), b.clone()]).unwrap();
        let two = PolicyCatalog::new(vec![b, a]).unwrap();
        assert_eq!(one.fingerprint(), two.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = PolicyCatalog::new(vec![PolicyProfile::strict("a", "a.v1", &["x"])]).unwrap();
        let b = PolicyCatalog::new(vec![PolicyProfile::strict("a", "a.v1", &["x", "y"])]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn duplicate_actions_rejected() {
        let p = PolicyProfile::strict("a", "a.v1", &[]);
        let err = PolicyCatalog::new(vec![p.clone(), p]).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("a".into()));
    }

    #[test]
    fn json_roundtrip_preserves_fingerprint() {
        let c = PolicyCatalog::builtin();
        let text = serde_json::to_string(&c.export()).unwrap();
        let parsed = PolicyCatalog::from_json(&text).unwrap();
        assert_eq!(parsed.fingerprint(), c.fingerprint());
    }

    #[test]
    fn from_json_applies_strict_defaults() {
        let c = PolicyCatalog::from_json(
            r#"{"profiles":[{"action":"x","name":"x.v1","allowlist":["a"]}]}"#,
        )
        .unwrap();
        let p = c.get("x").unwrap();
        assert!(p.deny_unknown_fields);
        assert!(!p.allow_external);
        assert!(p.forbidden_keys.is_empty());
    }

    #[test]
    fn from_json_rejects_schema_violations() {
        for bad in [
            r#"{"profiles":[]}"#,
            r#"{"profiles":[{"action":"x","allowlist":[]}]}"#,
            r#"{"profiles":[{"action":"x","name":"n","allowlist":["a","a"]}]}"#,
            r#"{"profiles":[{"action":"x","name":"n","allowlist":[],"extra":1}]}"#,
            r#"not json"#,
        ] {
            assert!(PolicyCatalog::from_json(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn from_file_reads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_string(&PolicyCatalog::builtin().export()).unwrap())
            .unwrap();
        assert_eq!(PolicyCatalog::from_file(&path).unwrap(), PolicyCatalog::builtin());
        assert!(PolicyCatalog::from_file(&dir.path().join("missing.json")).is_err());
    }
}
