//! # Storage Composition Module
//!
//! Builds storage backends from configuration and confines them to a tenant.
//!
//! ## Overview
//!
//! - [`factory`]: exhaustive mapping from
//!   [`StorageConfig`](core_runtime::config::StorageConfig) to a concrete
//!   backend (S3/OSS/COS, GitHub, local)
//! - [`path`]: key normalization shared by every tenant-facing call
//! - [`scoped`]: [`TenantScopedAdapter`], the decorator that prefixes every
//!   inbound key and strips the prefix from every outbound one
//!
//! ## Key scoping
//!
//! The effective prefix is `backend base / base prefix / tenant`. Backends that
//! take a root in their own configuration (GitHub `path`, local `basePath`)
//! get the prefix baked in once; S3-family backends get it prepended and
//! stripped on every call.

pub mod error;
pub mod factory;
pub mod path;
pub mod scoped;

pub use error::{Result, StorageError};
pub use factory::create_backend;
pub use path::normalize_key;
pub use scoped::{PrefixStrategy, TenantScopedAdapter};
