//! Privacy-preserving SHA-256 digests over canonical JSON.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use warden_core::types::Sha256Hex;

use crate::canonical::{canonical_object, canonical_string};

pub fn sha256_bytes(bytes: &[u8]) -> Sha256Hex {
    Sha256Hex::from_digest(format!("{:x}", Sha256::digest(bytes)))
}

pub fn sha256_value(value: &Value) -> Sha256Hex {
    sha256_bytes(canonical_string(value).as_bytes())
}

/// Digest of a borrowed object payload; equal to
/// `sha256_value(&Value::Object(map.clone()))`.
pub fn sha256_object(map: &Map<String, Value>) -> Sha256Hex {
    sha256_bytes(canonical_object(map).as_bytes())
}
