//! # Photo Asset Registry
//!
//! Owns the authoritative per-tenant record of every synced photo.
//!
//! ## Overview
//!
//! This crate manages:
//! - The SQLite schema and embedded migrations ([`db`])
//! - Asset domain models: manifests, records, statuses, conflict payloads
//!   ([`models`])
//! - The [`AssetRegistry`](repositories::AssetRegistry) repository consumed and
//!   updated by the sync layer
//!
//! Records are keyed by `(tenant_id, storage_provider, storage_key)`, where
//! `storage_key` is always tenant-relative. Batched writes are applied in one
//! transaction so a run or a conflict resolution lands completely or not at
//! all.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    AssetManifest, AssetRecord, AssetScope, AssetSummary, AssetWriteBatch, ConflictPayload,
    SyncStatus,
};
pub use repositories::{AssetRegistry, SqliteAssetRegistry};
