use anyhow::{bail, Context, Result};
use jsonschema::Validator;
use serde_json::Value;

const CATALOG_SCHEMA: &str = include_str!("../../schema/policy-catalog.schema.json");

pub fn catalog_validator() -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(CATALOG_SCHEMA).context("embedded schema is invalid JSON")?;
    Validator::new(&schema).map_err(|e| anyhow::anyhow!("schema compilation failed: {e}"))
}

/// Validate a policy catalog document against the embedded schema.
pub fn validate_catalog(data: &Value) -> Result<()> {
    let v = catalog_validator()?;
    if v.is_valid(data) {
        return Ok(());
    }
    let mut msgs: Vec<String> = Vec::new();
    for error in v.iter_errors(data) {
        let path = error.instance_path.to_string();
        let loc = if path.is_empty() {
            "(root)".into()
        } else {
            path
        };
        msgs.push(format!("  {loc}: {error}"));
    }
    bail!("catalog validation failed:\n{}", msgs.join("\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_schema_compiles() {
        assert!(catalog_validator().is_ok());
    }

    #[test]
    fn reports_instance_path() {
        let err = validate_catalog(&json!({"profiles": [{"action": 1, "name": "n", "allowlist": []}]}))
            .unwrap_err()
            .to_string();
        assert!(err.contains("/profiles/0/action"), "{err}");
    }
}
