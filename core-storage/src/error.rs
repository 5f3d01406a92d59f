use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("S3 client error: {0}")]
    S3(#[from] provider_s3::S3Error),

    #[error("Storage backend error: {0}")]
    Backend(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, StorageError>;
