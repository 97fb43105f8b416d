use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use warden_core::errors::RegistryError;
use warden_core::traits::Executor;

/// Executor id -> instance table.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<BTreeMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, executor: Arc<dyn Executor>) -> Result<(), RegistryError> {
        let id = executor.id().to_string();
        if id.trim().is_empty() {
            return Err(RegistryError::Invalid {
                id,
                message: "empty executor id".into(),
            });
        }
        let mut guard = self.executors.write().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        guard.insert(id, executor);
        Ok(())
    }

    /// Swap an executor in place (administrative and test path).
    pub fn replace(&self, executor: Arc<dyn Executor>) -> Option<Arc<dyn Executor>> {
        let id = executor.id().to_string();
        tracing::info!(executor_id = %id, "executor replaced");
        self.executors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, executor)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Executor>> {
        self.executors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.executors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
