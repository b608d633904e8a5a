//! Config store for loading and saving stool.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{StoolConfig, parser};
use crate::fs::write_atomic;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config; a missing file yields the defaults.
    pub fn load(&self) -> anyhow::Result<StoolConfig> {
        if !self.config_path.exists() {
            return Ok(StoolConfig::new());
        }
        parser::parse_stool_toml(&self.config_path)
    }

    pub fn save(&self, config: &StoolConfig) -> anyhow::Result<()> {
        config.validate()?;
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        write_atomic(&self.config_path, content.as_bytes()).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })
    }
}
