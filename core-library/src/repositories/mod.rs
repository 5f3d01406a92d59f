//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface consumed by the sync layer
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `AssetRegistry` - Per-tenant photo asset records and their sync status

pub mod asset;

pub use asset::{AssetRegistry, SqliteAssetRegistry};
