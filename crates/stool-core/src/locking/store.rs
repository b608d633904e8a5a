//! Lock table persistence shared by all processes of an installation.
//!
//! The table is a pretty-printed JSON document so operators can see who
//! holds what without special tooling. Every read-modify-write cycle runs
//! under an advisory `flock` on a sidecar guard file; the document itself is
//! replaced with tmp + rename so readers never observe a torn write.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::LockError;
use super::record::LockTable;
use crate::fs::write_atomic;

#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
    guard_path: PathBuf,
}

impl LockStore {
    pub fn new(path: PathBuf) -> Self {
        let mut guard = path.clone().into_os_string();
        guard.push(".guard");
        Self {
            path,
            guard_path: PathBuf::from(guard),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current table.
    pub fn read(&self) -> Result<LockTable, LockError> {
        let _guard = self.guard(false)?;
        self.load()
    }

    /// Run `f` on the current table and persist the result if it changed.
    pub fn update<T>(&self, f: impl FnOnce(&mut LockTable) -> T) -> Result<T, LockError> {
        let _guard = self.guard(true)?;
        let mut table = self.load()?;
        let before = self.serialize(&table)?;
        let result = f(&mut table);
        let after = self.serialize(&table)?;
        if before != after {
            write_atomic(&self.path, &after).map_err(|e| LockError::Store {
                path: self.path.clone(),
                message: "failed to write lock table".to_string(),
                source: Some(e.into()),
            })?;
        }
        Ok(result)
    }

    fn load(&self) -> Result<LockTable, LockError> {
        if !self.path.exists() {
            return Ok(LockTable::new());
        }
        let bytes = fs::read(&self.path)
            .map_err(|e| LockError::store(&self.path, "failed to read lock table", e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(LockTable::new());
        }
        let table: LockTable = serde_json::from_slice(&bytes)
            .map_err(|e| LockError::store(&self.path, "failed to parse lock table", e))?;
        table
            .validate()
            .map_err(|problem| LockError::corrupt(&self.path, problem))?;
        Ok(table)
    }

    fn serialize(&self, table: &LockTable) -> Result<Vec<u8>, LockError> {
        let mut bytes = serde_json::to_vec_pretty(table)
            .map_err(|e| LockError::store(&self.path, "failed to serialize lock table", e))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn guard(&self, exclusive: bool) -> Result<StoreGuard, LockError> {
        if let Some(parent) = self.guard_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LockError::store(parent, "failed to create lock directory", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.guard_path)
            .map_err(|e| LockError::store(&self.guard_path, "failed to open guard file", e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| LockError::store(&self.guard_path, "failed to lock guard file", e))?;
        Ok(StoreGuard { file })
    }
}

/// Holds the guard `flock` for one store access.
struct StoreGuard {
    file: File,
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::{Mode, Owner};
    use tempfile::TempDir;

    #[test]
    fn missing_file_reads_as_empty_table() {
        let temp = TempDir::new().unwrap();
        let store = LockStore::new(temp.path().join("locks.json"));

        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn update_persists_changes() {
        let temp = TempDir::new().unwrap();
        let store = LockStore::new(temp.path().join("locks.json"));
        let owner = Owner::new(7, "host", "stool start a");

        store
            .update(|table| table.try_lock("a", Mode::Exclusive, &owner))
            .unwrap()
            .unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("\"a\""));
        assert!(content.contains("stool start a"));
        assert!(store.read().unwrap().record("a").is_some());
    }

    #[test]
    fn unchanged_table_is_not_written() {
        let temp = TempDir::new().unwrap();
        let store = LockStore::new(temp.path().join("locks.json"));

        store.update(|_| ()).unwrap();

        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_table_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locks.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = LockStore::new(path).read().unwrap_err();
        assert!(matches!(err, LockError::Store { .. }));
    }
}
