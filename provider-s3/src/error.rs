//! Error types for the S3-compatible provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    /// Client could not be configured
    #[error("S3 configuration error: {0}")]
    Config(String),

    #[error("Failed to list bucket {bucket}: {message}")]
    List { bucket: String, message: String },

    #[error("Failed to fetch {key}: {message}")]
    Fetch { key: String, message: String },

    #[error("Failed to upload {key}: {message}")]
    Upload { key: String, message: String },

    #[error("Failed to copy {from} to {to}: {message}")]
    Copy {
        from: String,
        to: String,
        message: String,
    },

    #[error("Failed to delete {key}: {message}")]
    Delete { key: String, message: String },

    #[error("Object not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, S3Error>;

impl From<S3Error> for BridgeError {
    fn from(error: S3Error) -> Self {
        match error {
            S3Error::Config(msg) => BridgeError::NotAvailable(msg),
            S3Error::NotFound(key) => BridgeError::NotFound(key),
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = S3Error::Fetch {
            key: "t1/a.jpg".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(error.to_string(), "Failed to fetch t1/a.jpg: timeout");
    }

    #[test]
    fn test_error_conversion() {
        let bridge: BridgeError = S3Error::NotFound("a.jpg".to_string()).into();
        assert!(matches!(bridge, BridgeError::NotFound(_)));

        let bridge: BridgeError = S3Error::Config("no region".to_string()).into();
        assert!(matches!(bridge, BridgeError::NotAvailable(_)));

        let bridge: BridgeError = S3Error::List {
            bucket: "photos".to_string(),
            message: "denied".to_string(),
        }
        .into();
        assert!(matches!(bridge, BridgeError::OperationFailed(_)));
    }
}
