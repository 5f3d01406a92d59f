//! Storage Backend Abstraction
//!
//! A [`StorageBackend`] is one tenant-agnostic view over an object store: an
//! S3-compatible bucket, a Git repository or a local directory. Keys are
//! `/`-separated and relative to whatever root the backend was configured
//! with. Tenant isolation is layered on top by `core-storage`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::live_photo;

/// File extensions treated as still images when no explicit format list is
/// configured.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "heic", "heif", "tiff", "tif", "avif", "gif", "bmp", "dng",
];

/// File extensions treated as the motion half of a live photo.
pub const MOTION_EXTENSIONS: &[&str] = &["mov", "mp4"];

/// One object as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Backend content hash (S3 ETag, Git blob sha); not comparable across
    /// backends.
    pub etag: Option<String>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    /// Lower-cased extension of the key, if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.key)
    }
}

/// Options for [`StorageBackend::upload_file`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    /// Commit message for repository-backed stores.
    pub message: Option<String>,
}

impl UploadOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Lower-cased extension of a `/`-separated key.
pub fn extension_of(key: &str) -> Option<String> {
    let name = key.rsplit('/').next().unwrap_or(key);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_image_key(key: &str) -> bool {
    extension_of(key).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_motion_key(key: &str) -> bool {
    extension_of(key).is_some_and(|ext| MOTION_EXTENSIONS.contains(&ext.as_str()))
}

/// Object storage contract implemented by every backend.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StorageBackend;
///
/// async fn count_images(backend: &dyn StorageBackend) -> Result<usize> {
///     Ok(backend.list_images().await?.len())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short provider name recorded alongside every asset (`s3`, `github`, ...).
    fn provider(&self) -> &str;

    /// List every object under the backend root.
    ///
    /// # Errors
    ///
    /// A listing failure is fatal to a sync run; implementations must not
    /// return a partial listing as success.
    async fn list_all_files(&self) -> Result<Vec<StorageObject>>;

    /// List objects whose extension is a known still-image format.
    async fn list_images(&self) -> Result<Vec<StorageObject>> {
        Ok(self
            .list_all_files()
            .await?
            .into_iter()
            .filter(|o| is_image_key(&o.key))
            .collect())
    }

    /// Fetch an object's bytes. Returns `Ok(None)` if the key does not exist.
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>>;

    /// Create or overwrite an object.
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<StorageObject>;

    /// Move an object to a new key.
    async fn move_file(&self, from: &str, to: &str) -> Result<StorageObject>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete_file(&self, key: &str) -> Result<()>;

    /// Caller-facing URL for a key.
    fn generate_public_url(&self, key: &str) -> String;

    /// Pair still images with their motion clips, keyed by still key.
    /// `is_still` decides which keys are stills.
    fn detect_live_photos(
        &self,
        objects: &[StorageObject],
        is_still: &dyn Fn(&str) -> bool,
    ) -> HashMap<String, StorageObject> {
        live_photo::detect_live_photos_with(objects, is_still)
    }

    /// Upper bound on concurrent `get_file` calls, if the backend has one.
    fn download_concurrency(&self) -> Option<usize> {
        None
    }

    /// Most objects one listing returns, if the backend caps listings.
    ///
    /// A listing of exactly this many objects may be partial.
    fn listing_limit(&self) -> Option<usize> {
        None
    }
}
