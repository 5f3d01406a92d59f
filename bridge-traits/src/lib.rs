//! # Host Bridge Traits
//!
//! Capability contracts shared by the photo sync pipeline and the concrete
//! backend crates.
//!
//! ## Overview
//!
//! The core never talks to an object store, an HTTP stack or a log pipeline
//! directly. It depends on the traits in this crate and receives concrete
//! implementations at construction time:
//!
//! | Trait | Implementations |
//! |-------|-----------------|
//! | [`StorageBackend`](storage::StorageBackend) | `provider-s3`, `provider-github`, `provider-local` |
//! | [`HttpClient`](http::HttpClient) | `bridge-native` (reqwest) |
//! | [`Clock`](time::Clock) | [`SystemClock`](time::SystemClock), fixed clocks in tests |
//! | [`LoggerSink`](time::LoggerSink) | [`ConsoleLogger`](time::ConsoleLogger), host sinks |
//!
//! Live-photo pairing lives here as a pure function
//! ([`detect_live_photos`](live_photo::detect_live_photos)) because every
//! backend shares it as the default trait behaviour.
//!
//! ## Error Handling
//!
//! All bridge traits return [`BridgeError`](error::BridgeError). Backend
//! crates keep their own error enums and convert into `BridgeError` at the
//! trait boundary, keeping the object key or URL in the message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; implementations are shared behind
//! `Arc` across the worker pool.

pub mod error;
pub mod http;
pub mod live_photo;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use live_photo::{detect_live_photos, detect_live_photos_with};
pub use storage::{StorageBackend, StorageObject, UploadOptions};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
