use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::ContractError;

/// Correlation id for one governed request: a UUID, with or without hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    pub fn parse(s: &str) -> Result<Self, ContractError> {
        if is_uuid_shaped(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ContractError::InvalidTraceId(s.to_string()))
        }
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 8-4-4-4-12 hex groups; each separator is optional.
fn is_uuid_shaped(s: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let bytes = s.as_bytes();
    let mut pos = 0;
    for (i, len) in GROUPS.iter().enumerate() {
        if i > 0 && bytes.get(pos) == Some(&b'-') {
            pos += 1;
        }
        let end = pos + len;
        if end > bytes.len() || !bytes[pos..end].iter().all(u8::is_ascii_hexdigit) {
            return false;
        }
        pos = end;
    }
    pos == bytes.len()
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TraceId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TraceId::parse(s)
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TraceId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Lowercase 64-character hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Hex(String);

impl Sha256Hex {
    pub fn parse(s: &str) -> Result<Self, ContractError> {
        if is_lower_hex_digest(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ContractError::InvalidDigest(s.to_string()))
        }
    }

    /// Wrap the `{:x}` rendering of a SHA-256 output.
    pub fn from_digest(hex: String) -> Self {
        debug_assert!(is_lower_hex_digest(&hex), "not a sha256 hex digest: {hex}");
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `sha256:<hex>` form used for hash-chain links.
    pub fn prefixed(&self) -> String {
        format!("sha256:{}", self.0)
    }
}

fn is_lower_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl fmt::Display for Sha256Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Sha256Hex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Sha256Hex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha256Hex::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Terminal or intermediate status carried by an action result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Success,
    Failed,
    Blocked,
    Pending,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failed => "FAILED",
            ActionStatus::Blocked => "BLOCKED",
            ActionStatus::Pending => "PENDING",
        }
    }

    /// Statuses that may carry an empty reason-code list.
    pub fn allows_empty_reasons(self) -> bool {
        matches!(self, ActionStatus::Success | ActionStatus::Pending)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
