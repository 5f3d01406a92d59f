//! Synchronization primitives.
//!
//! All primitives are async-aware and `Send + Sync`; locks never block the
//! executor thread.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use core_async::sync::Semaphore;
//!
//! async fn example() {
//!     let limit = Arc::new(Semaphore::new(2));
//!     let _permit = limit.clone().acquire_owned().await.unwrap();
//!     assert_eq!(limit.available_permits(), 1);
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, AcquireError, Mutex, MutexGuard, Notify, OwnedSemaphorePermit,
    RwLock, RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};
pub use tokio_util::sync::CancellationToken;
