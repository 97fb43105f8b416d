#![forbid(unsafe_code)]

pub mod canonical;
pub mod digest;
pub mod limits;

pub use canonical::{canonical_bytes, canonical_object, canonical_string};
pub use digest::{sha256_bytes, sha256_object, sha256_value};
pub use limits::{check_object_limits, check_payload_limits, LimitError};
