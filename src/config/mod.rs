//! Engine configuration.
//!
//! Executor settings can be built in code or loaded from YAML.

mod error;
mod yaml;

pub use error::ConfigError;
pub use yaml::{EngineConfig, FailurePolicy};
