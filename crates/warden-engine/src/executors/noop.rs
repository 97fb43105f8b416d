use serde_json::Value;
use warden_core::contracts::ActionRequest;
use warden_core::errors::ExecutorError;
use warden_core::traits::{Executor, ExecutorLimits};

use crate::registry::router::EXECUTOR_NOOP;

/// Always succeeds with no output. No side effects.
#[derive(Default)]
pub struct NoopExecutor {
    capabilities: Vec<String>,
    limits: ExecutorLimits,
}

impl NoopExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for NoopExecutor {
    fn id(&self) -> &str {
        EXECUTOR_NOOP
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

    fn execute(&self, _request: &ActionRequest) -> Result<Option<Value>, ExecutorError> {
        Ok(None)
    }
}
