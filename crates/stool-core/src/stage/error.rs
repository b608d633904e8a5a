use std::path::PathBuf;

/// Errors raised by the stage store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("stage not found: {name}")]
    NotFound { name: String },

    #[error("stage already exists: {name}")]
    AlreadyExists { name: String },

    #[error("invalid stage name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stage record {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write stage record {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
