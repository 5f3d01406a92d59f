//! Async runtime facade for the photo sync pipeline.
//!
//! Every `core-*` and `provider-*` crate depends on this crate instead of
//! depending on Tokio directly. The modules re-export the Tokio primitives the
//! pipeline uses and add the few helpers that are shared across crates.
//!
//! # Modules
//!
//! - `task`: task spawning, `JoinSet` for fan-out
//! - `time`: sleep, timeouts, wall-clock helpers
//! - `sync`: mutexes, semaphores, channels
//! - `fs` / `io`: async filesystem and I/O traits
//! - `process`: child processes for isolated workers
//! - `runtime`: `block_on` used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod fs;
pub mod io;
pub mod process;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
