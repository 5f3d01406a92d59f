//! Per-object processing
//!
//! One unit of work: fetch the object, hash it, run the artifact generator
//! and derive the manifest. Deriving is split from fetching so a child
//! process can derive from bytes the parent already downloaded.

use std::sync::Arc;

use bridge_traits::error::BridgeError;
use bridge_traits::storage::StorageBackend;
use bytes::Bytes;
use core_async::sync::Semaphore;
use core_library::AssetManifest;
use core_metadata::{ExifData, MetadataExtractor};
use core_runtime::logging::TaggedLogger;
use sha2::{Digest, Sha256};

use crate::artifacts::{ArtifactGenerator, ArtifactOutput};
use crate::change_set::WorkUnit;
use crate::error::{Result, SyncError};

/// Hex SHA-256 of `data`.
pub fn content_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Manifest for `key` from bytes already in hand.
pub async fn derive_manifest(
    extractor: &MetadataExtractor,
    artifacts: &dyn ArtifactGenerator,
    key: &str,
    data: &Bytes,
    live_photo_key: Option<String>,
) -> Result<AssetManifest> {
    let output = artifacts.generate(key, data).await?;
    manifest_from_output(extractor, key, data, live_photo_key, output)
}

/// Manifest for `key` from bytes and a generator's output.
pub fn manifest_from_output(
    extractor: &MetadataExtractor,
    key: &str,
    data: &Bytes,
    live_photo_key: Option<String>,
    output: ArtifactOutput,
) -> Result<AssetManifest> {
    let digest = content_digest(data);
    let exif = output.exif.map(ExifData::from_json).transpose()?;

    Ok(extractor.build_manifest(
        key,
        exif.as_ref(),
        Some(digest),
        live_photo_key,
        output.artifacts,
    ))
}

pub struct AssetProcessor {
    storage: Arc<dyn StorageBackend>,
    extractor: MetadataExtractor,
    artifacts: Arc<dyn ArtifactGenerator>,
    downloads: Arc<Semaphore>,
}

impl AssetProcessor {
    /// `max_downloads` bounds concurrent `get_file` calls independently of
    /// the number of units in flight.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        extractor: MetadataExtractor,
        artifacts: Arc<dyn ArtifactGenerator>,
        max_downloads: usize,
    ) -> Self {
        Self {
            storage,
            extractor,
            artifacts,
            downloads: Arc::new(Semaphore::new(max_downloads.max(1))),
        }
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn artifacts(&self) -> &dyn ArtifactGenerator {
        self.artifacts.as_ref()
    }

    /// Download the unit's object under the download limit.
    pub async fn fetch(&self, unit: &WorkUnit, logger: &TaggedLogger) -> Result<Bytes> {
        let _permit = self
            .downloads
            .acquire()
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?;

        let data = self
            .storage
            .get_file(unit.key())
            .await?
            .ok_or_else(|| BridgeError::NotFound(unit.key().to_string()))?;

        logger.debug(format_args!("Fetched {} ({} bytes)", unit.key(), data.len()));
        Ok(data)
    }

    /// Fetch and derive in this process.
    pub async fn process(&self, unit: &WorkUnit, logger: &TaggedLogger) -> Result<AssetManifest> {
        let data = self.fetch(unit, logger).await?;
        derive_manifest(
            &self.extractor,
            self.artifacts.as_ref(),
            unit.key(),
            &data,
            unit.live_photo_key(),
        )
        .await
    }
}
