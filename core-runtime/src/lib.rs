//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the photo sync pipeline:
//! - Logging and tracing infrastructure with component tags
//! - Configuration types for storage backends, processing and workers
//! - Request payloads for sync runs and conflict resolution
//!
//! ## Overview
//!
//! Every other `core-*` crate depends on this one for its configuration
//! types and for the [`TaggedLogger`](logging::TaggedLogger) handles threaded
//! through the pipeline.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
