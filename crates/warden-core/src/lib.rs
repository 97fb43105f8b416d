#![forbid(unsafe_code)]

pub mod capabilities;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod reasons;
pub mod semver;
pub mod traits;
pub mod types;
