//! Error types for the GitHub provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GithubError {
    /// API request returned an error
    #[error("GitHub API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The tree API returned a partial listing
    #[error("Repository tree for {0} is truncated; listing would be incomplete")]
    TruncatedTree(String),

    /// Failed to parse API response
    #[error("Failed to parse GitHub response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, GithubError>;

impl From<GithubError> for BridgeError {
    fn from(error: GithubError) -> Self {
        match error {
            GithubError::ApiError {
                status_code: 404,
                message,
            } => BridgeError::NotFound(message),
            GithubError::Bridge(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
