//! Directory-backed stage records: one `stage.toml` per stage directory.

use std::path::{Path, PathBuf};

use super::{Stage, StoreError, validate_name};
use crate::fs::write_atomic;

const STAGE_FILE: &str = "stage.toml";
const SELECTED_FILE: &str = ".selected";

#[derive(Debug, Clone)]
pub struct StageStore {
    dir: PathBuf,
}

impl StageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stage_dir(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn stage_file(&self, name: &str) -> PathBuf {
        self.stage_dir(name).join(STAGE_FILE)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.stage_file(name).is_file()
    }

    pub fn load(&self, name: &str) -> Result<Stage, StoreError> {
        self.load_opt(name)?.ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn load_opt(&self, name: &str) -> Result<Option<Stage>, StoreError> {
        if validate_name(name).is_err() {
            return Ok(None);
        }
        let path = self.stage_file(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(path, err)),
        };
        let stage: Stage =
            toml::from_str(&content).map_err(|source| StoreError::Parse { path, source })?;
        Ok(Some(stage))
    }

    /// Every stage, sorted by name. Directories without a record are skipped.
    pub fn list(&self) -> Result<Vec<Stage>, StoreError> {
        let mut names = self.names()?;
        names.sort();
        let mut stages = Vec::with_capacity(names.len());
        for name in names {
            if let Some(stage) = self.load_opt(&name)? {
                stages.push(stage);
            }
        }
        Ok(stages)
    }

    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.dir, err)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(&self.dir, err))?;
            if !entry.path().join(STAGE_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Persist a new stage; fails when the name is taken.
    pub fn create(&self, stage: &Stage) -> Result<(), StoreError> {
        validate_name(&stage.name)?;
        if self.exists(&stage.name) {
            return Err(StoreError::AlreadyExists {
                name: stage.name.clone(),
            });
        }
        self.save(stage)
    }

    pub fn save(&self, stage: &Stage) -> Result<(), StoreError> {
        validate_name(&stage.name)?;
        let path = self.stage_file(&stage.name);
        let content = toml::to_string_pretty(stage).map_err(|err| StoreError::Write {
            path: path.clone(),
            message: err.to_string(),
        })?;
        write_atomic(&path, content.as_bytes()).map_err(|err| StoreError::Write {
            path,
            message: format!("{err:#}"),
        })
    }

    /// Delete the stage directory; clears the selection if it pointed here.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        if !self.exists(name) {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        let dir = self.stage_dir(name);
        std::fs::remove_dir_all(&dir).map_err(|err| StoreError::io(dir, err))?;
        if self.selected()?.as_deref() == Some(name) {
            self.clear_selected()?;
        }
        Ok(())
    }

    /// Name of the operator's selected stage, if one is set.
    pub fn selected(&self) -> Result<Option<String>, StoreError> {
        let path = self.dir.join(SELECTED_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let name = content.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    pub fn select(&self, name: &str) -> Result<(), StoreError> {
        if !self.exists(name) {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        let path = self.dir.join(SELECTED_FILE);
        write_atomic(&path, format!("{name}\n").as_bytes()).map_err(|err| StoreError::Write {
            path,
            message: format!("{err:#}"),
        })
    }

    pub fn clear_selected(&self) -> Result<(), StoreError> {
        let path = self.dir.join(SELECTED_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_of_invalid_name_is_none() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = StageStore::new(temp.path());

        assert!(store.load_opt("@ports").unwrap().is_none());
        assert!(store.load("../etc").unwrap_err().is_not_found());
    }

    #[test]
    fn names_skip_plain_files_and_empty_dirs() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = StageStore::new(temp.path());
        store.create(&Stage::new("b", "alice", vec![])).unwrap();
        store.create(&Stage::new("a", "alice", vec![])).unwrap();
        std::fs::create_dir(temp.path().join("empty")).unwrap();
        std::fs::write(temp.path().join("stray.txt"), "x").unwrap();

        assert_eq!(store.names().unwrap(), vec!["a", "b"]);
    }
}
