use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid EXIF payload: {0}")]
    InvalidExif(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
