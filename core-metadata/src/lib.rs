//! # Photo Metadata Module
//!
//! Derives canonical photo metadata from storage keys and EXIF payloads.
//!
//! ## Overview
//!
//! This module handles:
//! - Filename conventions (`2024-01-15_sunset_120views.jpg`)
//! - EXIF tag, keyword and capture-date precedence
//! - Stable photo ids with an optional key digest suffix
//! - Assembly of the final [`AssetManifest`](core_library::AssetManifest)
//!
//! Extraction is pure apart from the wall-clock fallback for the capture date,
//! which goes through an injected [`Clock`](bridge_traits::Clock).

pub mod error;
pub mod exif;
pub mod extractor;

pub use error::{MetadataError, Result};
pub use exif::{ExifData, ExifText};
pub use extractor::{photo_id, ExtractedInfo, ExtractionOptions, MetadataExtractor};
