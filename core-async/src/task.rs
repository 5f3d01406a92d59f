//! Task spawning.
//!
//! `spawn` and `spawn_blocking` mirror Tokio. `JoinSet` is re-exported for
//! bounded fan-out where results are collected as they finish.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task::JoinSet;
//!
//! async fn example() {
//!     let mut set = JoinSet::new();
//!     for i in 0..4 {
//!         set.spawn(async move { i * 2 });
//!     }
//!     let mut total = 0;
//!     while let Some(res) = set.join_next().await {
//!         total += res.unwrap();
//!     }
//!     assert_eq!(total, 12);
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a new asynchronous task on the current runtime.
///
/// The spawned task may run on a different thread, so the future and its
/// output must be `Send + 'static`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

pub type Result<T> = std::result::Result<T, JoinError>;
