//! Environment-driven configuration for the governed execution core.
//!
//! Every variable is optional. An unparsable or out-of-range value falls back
//! to its default and logs a warning; defaults are the restrictive choice.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_EXECUTOR_TIMEOUT_S: &str = "WARDEN_EXECUTOR_TIMEOUT_S";
pub const ENV_CB_THRESHOLD: &str = "WARDEN_CB_THRESHOLD";
pub const ENV_CB_COOLDOWN_S: &str = "WARDEN_CB_COOLDOWN_S";
pub const ENV_RATE_LIMITS: &str = "WARDEN_RATE_LIMITS";
pub const ENV_DEFAULT_RATE_LIMIT: &str = "WARDEN_DEFAULT_RATE_LIMIT";
pub const ENV_RETRY_MAX: &str = "WARDEN_RETRY_MAX";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "WARDEN_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_TIMEOUT_S: &str = "WARDEN_RETRY_TIMEOUT_S";
pub const ENV_AUDIT_LOG_PATH: &str = "WARDEN_AUDIT_LOG_PATH";
pub const ENV_ACTION_AUDIT_LOG_PATH: &str = "WARDEN_ACTION_AUDIT_LOG_PATH";

/// Requests per minute for the bundled provider names.
pub const BUILTIN_RATE_LIMITS: [(&str, u32); 6] = [
    ("openai", 10),
    ("anthropic", 5),
    ("gemini", 60),
    ("grok", 10),
    ("deepseek", 5),
    ("fake", 1000),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Upper bound on a single executor invocation.
    pub executor_timeout: Duration,
    pub breaker: BreakerConfig,
    pub rate_limits: RateLimitConfig,
    pub retry: RetryConfig,
    pub audit_log_path: PathBuf,
    /// Separate sink for action records; decisions and actions share
    /// `audit_log_path` when unset.
    pub action_audit_log_path: Option<PathBuf>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            executor_timeout: Duration::from_secs(10),
            breaker: BreakerConfig::default(),
            rate_limits: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            audit_log_path: PathBuf::from("audit.log"),
            action_audit_log_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_provider: BTreeMap<String, u32>,
    pub default_limit: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_provider: BUILTIN_RATE_LIMITS
                .iter()
                .map(|(name, limit)| (name.to_string(), *limit))
                .collect(),
            default_limit: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, provider: &str) -> u32 {
        self.per_provider
            .get(provider)
            .copied()
            .unwrap_or(self.default_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Shared wall-clock budget across all attempts and sleeps.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GovernanceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests inject a map here).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var(&lookup, ENV_EXECUTOR_TIMEOUT_S, positive_secs) {
            config.executor_timeout = secs;
        }
        if let Some(n) = parse_var(&lookup, ENV_CB_THRESHOLD, positive_u32) {
            config.breaker.failure_threshold = n;
        }
        if let Some(secs) = parse_var(&lookup, ENV_CB_COOLDOWN_S, non_negative_secs) {
            config.breaker.cooldown = secs;
        }
        if let Some(n) = parse_var(&lookup, ENV_DEFAULT_RATE_LIMIT, positive_u32) {
            config.rate_limits.default_limit = n;
        }
        if let Some(raw) = lookup(ENV_RATE_LIMITS) {
            merge_rate_limits(&mut config.rate_limits.per_provider, &raw);
        }
        if let Some(n) = parse_var(&lookup, ENV_RETRY_MAX, |s| s.trim().parse::<u32>().ok()) {
            config.retry.max_retries = n;
        }
        if let Some(ms) = parse_var(&lookup, ENV_RETRY_BASE_DELAY_MS, |s| {
            s.trim().parse::<u64>().ok().map(Duration::from_millis)
        }) {
            config.retry.base_delay = ms;
        }
        if let Some(secs) = parse_var(&lookup, ENV_RETRY_TIMEOUT_S, positive_secs) {
            config.retry.timeout = secs;
        }
        if let Some(path) = lookup(ENV_AUDIT_LOG_PATH).filter(|p| !p.trim().is_empty()) {
            config.audit_log_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_ACTION_AUDIT_LOG_PATH).filter(|p| !p.trim().is_empty()) {
            config.action_audit_log_path = Some(PathBuf::from(path));
        }

        config
    }

    pub fn action_audit_path(&self) -> &PathBuf {
        self.action_audit_log_path
            .as_ref()
            .unwrap_or(&self.audit_log_path)
    }
}

fn parse_var<F, T, P>(lookup: &F, key: &str, parse: P) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let raw = lookup(key)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "invalid configuration value, using default");
    }
    parsed
}

fn positive_secs(s: &str) -> Option<Duration> {
    non_negative_secs(s).filter(|d| !d.is_zero())
}

fn non_negative_secs(s: &str) -> Option<Duration> {
    let v: f64 = s.trim().parse().ok()?;
    Duration::try_from_secs_f64(v).ok()
}

fn positive_u32(s: &str) -> Option<u32> {
    s.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Merge `provider=limit,provider=limit` entries; malformed entries are skipped.
fn merge_rate_limits(limits: &mut BTreeMap<String, u32>, raw: &str) {
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parsed = entry
            .split_once('=')
            .and_then(|(name, limit)| Some((name.trim(), positive_u32(limit)?)))
            .filter(|(name, _)| !name.is_empty());
        match parsed {
            Some((name, limit)) => {
                limits.insert(name.to_lowercase(), limit);
            }
            None => warn!(key = ENV_RATE_LIMITS, entry, "invalid rate limit entry, skipped"),
        }
    }
}
