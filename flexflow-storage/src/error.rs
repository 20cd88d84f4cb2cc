//! Storage error types.

use flexflow_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage key: '{0}'")]
    InvalidKey(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("failed to seed definition from '{}': {source}", path.display())]
    Seed {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Core(core) => core,
            other => CoreError::Storage(Box::new(other)),
        }
    }
}
