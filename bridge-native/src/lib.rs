//! # Native Bridge Implementations
//!
//! Default implementations of bridge traits for server and desktop hosts.
//!
//! ## Overview
//!
//! - [`ReqwestHttpClient`]: `HttpClient` backed by `reqwest` with rustls,
//!   connection pooling and retry of transient failures.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_native::ReqwestHttpClient;
//! use bridge_traits::{HttpClient, RetryPolicy};
//!
//! let client: Arc<dyn HttpClient> =
//!     Arc::new(ReqwestHttpClient::builder().retry_policy(RetryPolicy::default()).build()?);
//! ```

mod http;

pub use http::{ReqwestHttpClient, ReqwestHttpClientBuilder};
