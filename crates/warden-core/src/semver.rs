//! Strict `X.Y.Z` semantic versions with numeric per-segment ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid semantic version {0:?}: expected X.Y.Z")]
pub struct SemVerError(pub String);

impl SemVer {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SemVer {
    type Err = SemVerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SemVerError(s.to_string());
        let mut parts = s.split('.');
        let mut next = || -> Result<u64, SemVerError> {
            let seg = parts.next().ok_or_else(err)?;
            if seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            seg.parse().map_err(|_| err())
        };
        let version = SemVer::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub fn is_valid(s: &str) -> bool {
    s.parse::<SemVer>().is_ok()
}

/// Numeric comparison of two version strings (`1.10.0 > 1.9.0`).
pub fn compare(a: &str, b: &str) -> Result<Ordering, SemVerError> {
    Ok(a.parse::<SemVer>()?.cmp(&b.parse::<SemVer>()?))
}
