//! Workspace facade crate.
//!
//! Re-exports the photo sync crates so a host can depend on
//! `photo-sync-workspace` alone. The `native-http` feature (on by default)
//! pulls in the reqwest-backed HTTP client that GitHub storage needs.
//!
//! ```rust,ignore
//! use photo_sync_workspace::config::{PhotoSyncConfig, RunSyncRequest};
//! use photo_sync_workspace::{SqliteAssetRegistry, SyncCoordinator};
//!
//! let coordinator = SyncCoordinator::new(config, Arc::new(SqliteAssetRegistry::new(pool)))
//!     .with_http_client(Arc::new(ReqwestHttpClient::new()?));
//! let report = coordinator.run(RunSyncRequest::default()).await?;
//! ```

pub use bridge_traits as bridge;
pub use core_library as library;
pub use core_metadata as metadata;
pub use core_runtime::{config, logging};
pub use core_storage as storage;
pub use core_sync as sync;

pub use core_library::{AssetRegistry, SqliteAssetRegistry};
pub use core_sync::{SyncCoordinator, SyncError, SyncReport};

#[cfg(feature = "native-http")]
pub use bridge_native::ReqwestHttpClient;
