use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress for tenant {tenant_id}")]
    SyncInProgress { tenant_id: String },

    #[error("Listing failed: {0}")]
    Listing(#[source] BridgeError),

    #[error("Storage error: {0}")]
    Storage(#[from] core_storage::StorageError),

    #[error("Backend error: {0}")]
    Backend(#[from] BridgeError),

    #[error("Registry error: {0}")]
    Registry(#[from] LibraryError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] core_metadata::MetadataError),

    #[error("Unknown conflict resolution strategy: {0}")]
    UnknownStrategy(String),

    #[error("No unresolved conflict for key {key}")]
    ConflictNotFound { key: String },

    #[error("Artifact generation failed for {key}: {message}")]
    Artifact { key: String, message: String },

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Unit timeout after {0} ms")]
    Timeout(u64),

    #[error("Invalid worker payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
