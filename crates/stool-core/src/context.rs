//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use crate::config::ConfigStore;
use crate::locking::{LockManager, LockOptions, LockStore, Owner};
use crate::stage::{LocalEngine, StageStore};

/// Environment variable selecting the installation directory.
pub const HOME_ENV: &str = "STOOL_HOME";

/// Paths of one installation.
///
/// Frontends create this once and pass it to commands; every store and
/// manager is derived from the installation directory.
#[derive(Debug, Clone)]
pub struct AppContext {
    home_dir: PathBuf,
}

impl AppContext {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    /// Resolve the installation from `explicit`, then `STOOL_HOME`, then the
    /// platform data directory.
    pub fn discover(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(home) = explicit {
            return Ok(Self::new(home));
        }
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(home)));
        }
        let data = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::new(data.join("stool")))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.home_dir.join("stool.toml")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.home_dir.join("locks.json")
    }

    pub fn stages_dir(&self) -> PathBuf {
        self.home_dir.join("stages")
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::new(self.config_path())
    }

    pub fn stage_store(&self) -> StageStore {
        StageStore::new(self.stages_dir())
    }

    pub fn lock_store(&self) -> LockStore {
        LockStore::new(self.lock_file())
    }

    /// Lock manager for this process, tagged with `operation`.
    pub fn lock_manager(&self, operation: &str, options: LockOptions) -> LockManager {
        LockManager::new(self.lock_store(), Owner::current(operation), options)
    }

    pub fn local_engine(&self) -> LocalEngine {
        LocalEngine::new(self.stages_dir())
    }
}
