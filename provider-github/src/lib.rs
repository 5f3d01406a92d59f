//! # GitHub Repository Provider
//!
//! Implements `StorageBackend` over a GitHub repository through the REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Recursive listing through the git trees API (blob sha as content hash)
//! - Fetches from the raw content host
//! - Uploads and deletes through the contents API (base64 payloads)
//! - Public URLs on `raw.githubusercontent.com` or the `blob` view
//!
//! All requests go through the injected
//! [`HttpClient`](bridge_traits::http::HttpClient), which owns retries.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GithubStorageBackend;
pub use error::{GithubError, Result};
