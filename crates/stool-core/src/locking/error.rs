use std::path::PathBuf;

use super::Mode;

/// Errors raised by the lock manager and its store.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Bounded wait exceeded; the lock is not held afterwards.
    #[error(
        "timed out after {waited_secs}s waiting for {mode} lock on '{resource}': held by {holder} running '{operation}'"
    )]
    Timeout {
        resource: String,
        mode: Mode,
        holder: String,
        operation: String,
        waited_secs: u64,
    },

    /// Release of a lock the owner does not hold. Indicates a caller bug.
    #[error("cannot release {mode} lock on '{resource}': not held by {owner}")]
    NotHeld {
        resource: String,
        mode: Mode,
        owner: String,
    },

    /// The persisted lock table could not be read, parsed or written.
    #[error("lock store {path}: {message}")]
    Store {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LockError {
    pub(crate) fn store(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LockError::Store {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LockError::Store {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }
}
