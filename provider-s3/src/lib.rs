//! # S3-Compatible Storage Provider
//!
//! Implements `StorageBackend` for Amazon S3, Alibaba Cloud OSS and Tencent
//! Cloud COS through `aws-sdk-s3`.
//!
//! ## Overview
//!
//! This module provides:
//! - SDK client construction from [`S3CompatibleConfig`](core_runtime::config::S3CompatibleConfig)
//!   (endpoint, credentials, retry mode, timeouts)
//! - Paginated listing with prefix filtering, `excludeRegex` and `maxFileLimit`
//! - Object fetch, upload, copy-based move and delete
//! - Public URLs through a custom domain, the endpoint, or the AWS host
//!
//! Keys are full bucket keys; tenant prefixing is applied by the caller.

pub mod client;
pub mod connector;
pub mod error;

pub use connector::S3StorageBackend;
pub use error::{Result, S3Error};
