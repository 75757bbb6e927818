//! YAML configuration parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::ConfigError;

/// What the executor does when a task unit returns an error.
///
/// The engine never retries; retry belongs inside task units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Halt the failing branch without firing a terminal callback.
    #[default]
    Halt,

    /// Treat the failure as reaching `ERROR`.
    RouteToError,
}

/// Executor configuration.
///
/// ```yaml
/// workers: 4
/// failure_policy: route_to_error
/// max_steps: 10000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the worker pool.
    pub workers: usize,
    /// Handling of task unit errors.
    pub failure_policy: FailurePolicy,
    /// Upper bound on node actions per run. Unlimited when absent.
    pub max_steps: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            failure_policy: FailurePolicy::default(),
            max_steps: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }

        if self.max_steps == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "max_steps cannot be zero".into(),
            ));
        }

        Ok(())
    }
}
