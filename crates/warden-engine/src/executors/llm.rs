//! Text-generation executor with governed provider fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use warden_core::contracts::{ActionRequest, CancelToken};
use warden_core::errors::{ExecutorError, ProviderError};
use warden_core::traits::{Executor, ExecutorLimits};
use warden_digest::sha256_bytes;

use crate::registry::actions::CAP_TEXT_GENERATION;
use crate::registry::router::EXECUTOR_LLM;
use crate::resilience::{ResilienceError, ResilienceLayer};

/// Hard limits every generation request must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPolicy {
    pub allowed_models: Vec<String>,
    pub temperature: f64,
    pub max_prompt_chars: usize,
    pub max_tokens_total: u64,
    pub timeout: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            allowed_models: vec!["gpt-4".into(), "gpt-3.5-turbo".into()],
            temperature: 0.0,
            max_prompt_chars: 10_000,
            max_tokens_total: 4096,
            timeout: Duration::from_secs(30),
        }
    }
}

impl GenerationPolicy {
    pub fn validate(&self, prompt: &str, model: &str, max_tokens: u64) -> Result<(), ExecutorError> {
        let violation = |what: &str| Err(ExecutorError::PolicyViolation(format!("POLICY_VIOLATION: {what}")));
        if prompt.is_empty() {
            return violation("empty prompt");
        }
        if prompt.chars().count() > self.max_prompt_chars {
            return violation("prompt too long");
        }
        if !self.allowed_models.iter().any(|m| m == model) {
            return violation("model not allowed");
        }
        if max_tokens == 0 || max_tokens > self.max_tokens_total {
            return violation("max_tokens out of range");
        }
        if self.timeout.is_zero() {
            return violation("timeout must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub timeout: Duration,
}

/// An external text-generation backend. Implementations must return an error
/// rather than a partial response.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<Value, ProviderError>;
}

/// Deterministic offline provider: `FAKE::<first 8 hex of sha256(prompt)>`.
#[derive(Debug, Default, Clone)]
pub struct FakeProvider {
    simulate_timeout: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timing_out() -> Self {
        Self { simulate_timeout: true }
    }
}

impl TextProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<Value, ProviderError> {
        if self.simulate_timeout {
            return Err(ProviderError::Timeout(self.name().to_string()));
        }
        let digest = sha256_bytes(request.prompt.as_bytes());
        Ok(json!({
            "text": format!("FAKE::{}", &digest.as_str()[..8]),
            "usage": {"prompt": 0, "completion": 1, "total": 1},
            "model": request.model,
            "latency_ms": 1,
        }))
    }
}

pub struct LlmExecutor {
    providers: Vec<Arc<dyn TextProvider>>,
    resilience: Arc<ResilienceLayer>,
    policy: GenerationPolicy,
    capabilities: Vec<String>,
    limits: ExecutorLimits,
}

impl LlmExecutor {
    /// Providers are tried in order until one succeeds.
    pub fn new(providers: Vec<Arc<dyn TextProvider>>, resilience: Arc<ResilienceLayer>) -> Self {
        Self::with_policy(providers, resilience, GenerationPolicy::default())
    }

    pub fn with_policy(
        providers: Vec<Arc<dyn TextProvider>>,
        resilience: Arc<ResilienceLayer>,
        policy: GenerationPolicy,
    ) -> Self {
        let limits = ExecutorLimits {
            timeout: policy.timeout,
            max_payload_bytes: policy.max_prompt_chars,
            ..ExecutorLimits::default()
        };
        Self {
            providers,
            resilience,
            policy,
            capabilities: vec![CAP_TEXT_GENERATION.to_string()],
            limits,
        }
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    fn parse(payload: &Map<String, Value>) -> Result<(&str, &str, u64), ExecutorError> {
        let invalid = || ExecutorError::InvalidPayload("INVALID_PAYLOAD".into());
        if payload.len() != 3 {
            return Err(invalid());
        }
        let prompt = payload.get("prompt").and_then(Value::as_str).ok_or_else(invalid)?;
        let model = payload.get("model").and_then(Value::as_str).ok_or_else(invalid)?;
        let max_tokens = payload.get("max_tokens").and_then(Value::as_u64).ok_or_else(invalid)?;
        Ok((prompt, model, max_tokens))
    }

    /// Providers in order until one answers. Stops as soon as `cancel` fires,
    /// leaving breakers and rate limits as they were.
    fn generate_with_fallback(&self, request: &GenerationRequest, cancel: &CancelToken) -> Result<Value, ExecutorError> {
        let mut attempted = Vec::new();
        let mut last_error = None;
        for provider in &self.providers {
            let name = provider.name();
            if cancel.is_cancelled() {
                debug!(provider = name, attempted = ?attempted, "generation cancelled");
                return Err(ExecutorError::Cancelled);
            }
            attempted.push(name);
            if self.resilience.is_open(name) {
                warn!(provider = name, "skipping provider with open circuit");
                continue;
            }
            match self
                .resilience
                .call_cancellable(name, cancel, ProviderError::is_transient, || provider.generate(request))
            {
                Ok(response) => {
                    if attempted.len() > 1 {
                        warn!(provider = name, attempted = ?attempted, "primary provider failed, fallback succeeded");
                    }
                    return Ok(response);
                }
                Err(ResilienceError::Cancelled { .. }) => return Err(ExecutorError::Cancelled),
                Err(err) => {
                    warn!(provider = name, error = %err, "provider failed, trying next");
                    last_error = Some(err);
                }
            }
        }
        let last = last_error.map_or_else(|| "none".to_string(), |e: ResilienceError<ProviderError>| e.to_string());
        Err(ExecutorError::Provider(format!(
            "ALL_PROVIDERS_FAILED: tried {} ({}); last error: {last}",
            attempted.len(),
            attempted.join(", ")
        )))
    }
}

impl Executor for LlmExecutor {
    fn id(&self) -> &str {
        EXECUTOR_LLM
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
        let (prompt, model, max_tokens) = Self::parse(&request.payload)?;
        self.policy.validate(prompt, model, max_tokens)?;
        let generation = GenerationRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
            temperature: self.policy.temperature,
            max_tokens,
            timeout: self.policy.timeout,
        };
        debug!(trace_id = %request.trace_id, model, "dispatching generation request");
        let response = self.generate_with_fallback(&generation, &request.cancel)?;
        let field = |key: &str| response.get(key).cloned().unwrap_or(Value::Null);
        Ok(Some(json!({
            "text": field("text"),
            "model": field("model"),
            "usage": field("usage"),
        })))
    }
}
