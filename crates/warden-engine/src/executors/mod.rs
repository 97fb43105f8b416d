pub mod llm;
pub mod noop;
pub mod rule_evaluator;
pub mod text_process;

use std::sync::Arc;

pub use llm::{FakeProvider, GenerationPolicy, GenerationRequest, LlmExecutor, TextProvider};
pub use noop::NoopExecutor;
pub use rule_evaluator::RuleEvaluatorExecutor;
pub use text_process::TextProcessExecutor;

use crate::registry::ExecutorRegistry;
use crate::resilience::ResilienceLayer;

/// Registry with every bundled executor. The LLM executor uses the offline
/// `FakeProvider` only.
pub fn builtin_registry(resilience: Arc<ResilienceLayer>) -> ExecutorRegistry {
    let registry = ExecutorRegistry::new();
    registry.replace(Arc::new(TextProcessExecutor::new()));
    registry.replace(Arc::new(NoopExecutor::new()));
    registry.replace(Arc::new(RuleEvaluatorExecutor::new()));
    registry.replace(Arc::new(LlmExecutor::new(vec![Arc::new(FakeProvider::new())], resilience)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActionRouter;

    #[test]
    fn every_route_resolves() {
        let registry = builtin_registry(Arc::new(ResilienceLayer::default()));
        for executor in ActionRouter::builtin().routes().values() {
            assert!(registry.get(executor).is_some(), "{executor} not registered");
        }
        assert_eq!(registry.ids().len(), 4);
    }
}
