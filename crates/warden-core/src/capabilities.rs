use std::collections::BTreeSet;

/// Trim, upper-case, drop empties, dedupe and sort.
pub fn normalize<I, S>(caps: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    caps.into_iter()
        .map(|c| c.as_ref().trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Outcome of checking an executor's capabilities against an action's needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityCheck {
    Satisfied,
    /// The executor declares no capabilities at all.
    Undeclared,
    /// Required capabilities the executor lacks (normalized, sorted).
    Missing(Vec<String>),
}

pub fn check(required: &[String], provided: Option<&[String]>) -> CapabilityCheck {
    let required = normalize(required);
    if required.is_empty() {
        return CapabilityCheck::Satisfied;
    }
    let provided = match provided {
        Some(p) if !p.is_empty() => normalize(p),
        _ => return CapabilityCheck::Undeclared,
    };
    let missing: Vec<String> = required
        .into_iter()
        .filter(|c| provided.binary_search(c).is_err())
        .collect();
    if missing.is_empty() {
        CapabilityCheck::Satisfied
    } else {
        CapabilityCheck::Missing(missing)
    }
}
