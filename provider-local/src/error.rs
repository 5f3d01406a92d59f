//! Error types for the local filesystem provider

use bridge_traits::error::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalStorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key would resolve outside the base directory
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, LocalStorageError>;

impl LocalStorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<LocalStorageError> for BridgeError {
    fn from(error: LocalStorageError) -> Self {
        match error {
            LocalStorageError::Io { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                BridgeError::NotFound(path.display().to_string())
            }
            LocalStorageError::Io { source, .. } => BridgeError::Io(source),
            LocalStorageError::InvalidKey(key) => BridgeError::InvalidInput(key),
        }
    }
}
