use serde_json::{json, Value};
use warden_core::contracts::ActionRequest;
use warden_core::errors::ExecutorError;
use warden_core::traits::{Executor, ExecutorLimits};

use crate::registry::actions::CAP_TEXT_PROCESSING;
use crate::registry::router::EXECUTOR_TEXT_PROCESS;

/// Upper-cases the `text` field.
pub struct TextProcessExecutor {
    capabilities: Vec<String>,
    limits: ExecutorLimits,
}

impl TextProcessExecutor {
    pub fn new() -> Self {
        Self {
            capabilities: vec![CAP_TEXT_PROCESSING.to_string()],
            limits: ExecutorLimits::default(),
        }
    }
}

impl Default for TextProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for TextProcessExecutor {
    fn id(&self) -> &str {
        EXECUTOR_TEXT_PROCESS
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
        let text = match request.payload.get("text") {
            Some(Value::String(s)) => s,
            Some(_) => return Err(ExecutorError::InvalidPayload("field 'text' must be a string".into())),
            None => return Err(ExecutorError::InvalidPayload("missing required field: text".into())),
        };
        let processed = text.to_uppercase();
        let length = processed.chars().count();
        Ok(Some(json!({ "processed": processed, "length": length })))
    }
}
