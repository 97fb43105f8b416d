pub mod catalog;
pub mod gate;
pub mod rules;
pub mod schema;

pub use catalog::{PolicyCatalog, PolicyProfile};
pub use gate::PolicyGate;
pub use rules::{Rule, RuleFn, RuleOutcome, DEFAULT_RULES};
