//! # Sync Engine
//!
//! Diffs one tenant's remote listing against the asset registry.
//!
//! ## Workflow
//!
//! 1. List every object through the tenant-scoped backend. A listing failure
//!    aborts the run before anything is classified.
//! 2. Pair stills with motion clips (when live-photo detection is enabled).
//! 3. Load the registry rows for the (tenant, provider) scope.
//! 4. Sort each supported object into new, candidate or unchanged using
//!    listing data only; every registry key missing from the listing is
//!    removed, unless the listing hit the backend's listing limit and may be
//!    partial.
//!
//! Candidates are settled after processing by [`WorkUnit::classify`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bridge_traits::storage::{extension_of, StorageBackend, StorageObject};
use core_library::{AssetRecord, AssetRegistry, AssetScope, SyncStatus};
use core_runtime::config::ProcessingConfig;
use core_runtime::logging::TaggedLogger;
use tracing::{debug, instrument};

use crate::change_set::WorkUnit;
use crate::error::{Result, SyncError};

/// Listing-phase result for one run.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// New keys and candidates, sorted by key.
    pub units: Vec<WorkUnit>,
    pub unchanged: Vec<String>,
    /// Records whose key the listing no longer reports.
    pub removed: Vec<AssetRecord>,
    pub skipped: Vec<String>,
    pub listed: usize,
    /// The listing reached the backend's limit; nothing was retired.
    pub partial: bool,
}

impl SyncPlan {
    pub fn new_count(&self) -> usize {
        self.units.iter().filter(|u| u.existing.is_none()).count()
    }

    pub fn candidate_count(&self) -> usize {
        self.units.len() - self.new_count()
    }
}

pub struct SyncEngine {
    storage: Arc<dyn StorageBackend>,
    registry: Arc<dyn AssetRegistry>,
    scope: AssetScope,
    processing: ProcessingConfig,
    logger: TaggedLogger,
}

impl SyncEngine {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        registry: Arc<dyn AssetRegistry>,
        scope: AssetScope,
        processing: ProcessingConfig,
    ) -> Self {
        Self {
            storage,
            registry,
            scope,
            processing,
            logger: TaggedLogger::component("Sync"),
        }
    }

    pub fn with_logger(mut self, logger: TaggedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn scope(&self) -> &AssetScope {
        &self.scope
    }

    /// Run the listing phase.
    ///
    /// # Errors
    ///
    /// [`SyncError::Listing`] when the backend cannot list, or a registry
    /// error when the current records cannot be read.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn plan(&self) -> Result<SyncPlan> {
        let listing = self
            .storage
            .list_all_files()
            .await
            .map_err(SyncError::Listing)?;

        let is_still =
            |key: &str| extension_of(key).is_some_and(|ext| self.processing.is_supported(&ext));
        let pairs = if self.processing.enable_live_photo_detection {
            self.storage.detect_live_photos(&listing, &is_still)
        } else {
            HashMap::new()
        };

        let records: HashMap<String, AssetRecord> = self
            .registry
            .list(&self.scope)
            .await?
            .into_iter()
            .map(|r| (r.storage_key.clone(), r))
            .collect();

        let listed_keys: HashSet<&str> = listing.iter().map(|o| o.key.as_str()).collect();
        let paired_motion: HashSet<&str> = pairs.values().map(|o| o.key.as_str()).collect();

        let mut plan = SyncPlan {
            listed: listing.len(),
            partial: self
                .storage
                .listing_limit()
                .is_some_and(|max| listing.len() >= max),
            ..SyncPlan::default()
        };

        for object in &listing {
            let supported = object
                .extension()
                .is_some_and(|ext| self.processing.is_supported(&ext));
            if !supported {
                if !paired_motion.contains(object.key.as_str()) {
                    plan.skipped.push(object.key.clone());
                }
                continue;
            }

            let live_photo = pairs.get(&object.key).cloned();
            let existing = records.get(&object.key);

            if existing.is_some_and(|record| !needs_processing(record, object, live_photo.as_ref())) {
                plan.unchanged.push(object.key.clone());
                continue;
            }

            plan.units.push(WorkUnit {
                object: object.clone(),
                live_photo,
                existing: existing.cloned(),
            });
        }

        if plan.partial {
            self.logger.warn(format_args!(
                "Listing stopped at the {} object limit; unlisted records are kept",
                plan.listed
            ));
        } else {
            let mut removed: Vec<AssetRecord> = records
                .into_values()
                .filter(|r| !listed_keys.contains(r.storage_key.as_str()))
                .collect();
            removed.sort_by(|a, b| a.storage_key.cmp(&b.storage_key));
            plan.removed = removed;
        }

        plan.units.sort_by(|a, b| a.object.key.cmp(&b.object.key));
        plan.unchanged.sort();
        plan.skipped.sort();

        self.logger.info(format_args!(
            "Listed {} objects: {} new, {} candidates, {} unchanged, {} removed, {} skipped",
            plan.listed,
            plan.new_count(),
            plan.candidate_count(),
            plan.unchanged.len(),
            plan.removed.len(),
            plan.skipped.len()
        ));
        debug!("Live photo pairs: {}", pairs.len());
        Ok(plan)
    }
}

/// Whether listing data alone shows `record` may be stale.
fn needs_processing(
    record: &AssetRecord,
    object: &StorageObject,
    live_photo: Option<&StorageObject>,
) -> bool {
    let live_photo_key = live_photo.map(|o| o.key.as_str());
    match (record.sync_status, &record.conflict) {
        // A pending edit changes the manifest only; size and etag still
        // describe the remote as last synced.
        (SyncStatus::Synced | SyncStatus::Pending, _) => {
            record.size != object.size
                || record.etag != object.etag
                || record.manifest.live_photo_key.as_deref() != live_photo_key
        }
        // An open conflict is only re-examined when the remote side moved
        // again since it was recorded.
        (SyncStatus::Conflict, Some(conflict)) => {
            conflict.remote_size != object.size
                || conflict.remote_etag != object.etag
                || conflict.remote_manifest.live_photo_key.as_deref() != live_photo_key
        }
        (SyncStatus::Conflict, None) => true,
    }
}
