#![forbid(unsafe_code)]

pub mod audit;
pub mod executors;
pub mod governor;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod resilience;

pub use governor::{Governor, GovernorError, Submission};
pub use pipeline::GovernedPipeline;
