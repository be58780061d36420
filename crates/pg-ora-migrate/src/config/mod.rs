//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::transfer::TransferConfig;
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

    /// Pipeline settings derived from the migration section.
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            batch_size: self.migration.batch_size,
            commit_every: self.migration.commit_every,
            null_policy: self.migration.null_policy,
            sentinels: self.migration.null_sentinels.clone(),
            order_by_primary_key: self.migration.order_by_primary_key,
        }
    }
}

impl SourceConfig {
    /// `host:port/database`, for log messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
