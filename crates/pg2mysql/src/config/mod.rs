//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

/// Settings the engines read, split from the connection settings.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub migration: MigrationConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            migration: config.migration.clone(),
            diagnostics: config.diagnostics.clone(),
        }
    }
}

impl DatabaseConfig {
    /// Human-readable endpoint for logs, without credentials.
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}/{}", self.flavor, self.host, self.port(), self.database)
    }
}
