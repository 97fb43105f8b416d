pub mod actions;
pub mod executors;
pub mod router;

pub use actions::{ActionMeta, ActionRegistry, LEGACY_ACTIONS};
pub use executors::ExecutorRegistry;
pub use router::ActionRouter;
