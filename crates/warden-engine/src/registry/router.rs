use std::collections::BTreeMap;

use crate::policy::catalog::{ACTION_LLM_GENERATE, ACTION_NOOP, ACTION_PROCESS, ACTION_RULE_EVALUATE};

pub const EXECUTOR_TEXT_PROCESS: &str = "text_process_v1";
pub const EXECUTOR_NOOP: &str = "noop_executor_v1";
pub const EXECUTOR_RULE_EVALUATOR: &str = "rule_evaluator_v1";
pub const EXECUTOR_LLM: &str = "llm_executor_v1";

/// Static action -> executor id map. Changes here change execution routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRouter {
    routes: BTreeMap<String, String>,
}

impl ActionRouter {
    pub fn new<I, A, E>(routes: I) -> Self
    where
        I: IntoIterator<Item = (A, E)>,
        A: Into<String>,
        E: Into<String>,
    {
        Self {
            routes: routes
                .into_iter()
                .map(|(a, e)| (a.into(), e.into()))
                .collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new([
            (ACTION_PROCESS, EXECUTOR_TEXT_PROCESS),
            (ACTION_NOOP, EXECUTOR_NOOP),
            (ACTION_RULE_EVALUATE, EXECUTOR_RULE_EVALUATOR),
            (ACTION_LLM_GENERATE, EXECUTOR_LLM),
        ])
    }

    pub fn route(&self, action: &str) -> Option<&str> {
        self.routes.get(action).map(String::as_str)
    }

    pub fn routes(&self) -> &BTreeMap<String, String> {
        &self.routes
    }
}

impl Default for ActionRouter {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_routes() {
        let r = ActionRouter::builtin();
        assert_eq!(r.route("process"), Some(EXECUTOR_TEXT_PROCESS));
        assert_eq!(r.route("llm_generate"), Some(EXECUTOR_LLM));
        assert_eq!(r.route("unknown"), None);
    }

    #[test]
    fn custom_routes() {
        let r = ActionRouter::new([("a", "exec_a")]);
        assert_eq!(r.route("a"), Some("exec_a"));
        assert_eq!(r.route("process"), None);
    }
}
