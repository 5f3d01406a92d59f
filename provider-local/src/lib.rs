//! # Local Filesystem Provider
//!
//! Implements `StorageBackend` over a directory tree. Keys are
//! `/`-separated paths relative to `basePath`; public URLs are `baseUrl/key`.

pub mod connector;
pub mod error;

pub use connector::LocalStorageBackend;
pub use error::{LocalStorageError, Result};
