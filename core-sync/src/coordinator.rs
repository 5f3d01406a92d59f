//! # Sync Coordinator
//!
//! Single entry point for the two operations collaborators trigger: a sync
//! run and a conflict resolution.
//!
//! ## Workflow
//!
//! ### Sync run
//! 1. Apply the request overrides to the tenant configuration and validate
//! 2. Connect the tenant-scoped storage backend
//! 3. List and classify against the registry (barrier)
//! 4. Process new and candidate objects on the bounded pool
//! 5. Settle candidates into unchanged / updated / conflict
//! 6. Write every change for the run in one batch (skipped for dry runs)
//!
//! ### Conflict resolution
//! 1. Parse the strategy; an unknown strategy fails before any read
//! 2. Resolve the targeted conflicts in one batch (skipped for dry runs)
//!
//! Both operations hold the tenant's run slot, so a resolution never
//! interleaves with a sync run for the same tenant.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//!
//! let coordinator = SyncCoordinator::new(config, registry)
//!     .with_http_client(http_client);
//!
//! let report = coordinator.run(RunSyncRequest::default()).await?;
//! println!("{} new, {} conflicts", report.new.len(), report.conflicts.len());
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use bridge_traits::http::HttpClient;
use bridge_traits::storage::StorageBackend;
use bridge_traits::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_async::sync::Mutex;
use core_library::{
    AssetManifest, AssetRecord, AssetRegistry, AssetScope, AssetWriteBatch, ConflictPayload,
    SyncStatus,
};
use core_metadata::{ExtractionOptions, MetadataExtractor};
use core_runtime::config::{PhotoSyncConfig, ResolveConflictRequest, RunSyncRequest};
use core_runtime::logging::TaggedLogger;
use core_storage::TenantScopedAdapter;
use tracing::{info, instrument};

use crate::artifacts::{ArtifactGenerator, NoopArtifactGenerator};
use crate::change_set::{ChangeKind, ChangedAsset, ProcessingFailure, SyncReport, WorkUnit};
use crate::conflict_resolver::{ConflictResolver, ResolutionReport, ResolutionStrategy};
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::isolation::ProcessIsolation;
use crate::orchestrator::Orchestrator;
use crate::processor::AssetProcessor;

pub struct SyncCoordinator {
    config: PhotoSyncConfig,
    registry: Arc<dyn AssetRegistry>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Arc<dyn Clock>,
    artifacts: Arc<dyn ArtifactGenerator>,
    isolation: Option<ProcessIsolation>,
    /// Tenants with a run or resolution in progress
    active_syncs: Arc<Mutex<HashSet<String>>>,
    logger: TaggedLogger,
}

impl SyncCoordinator {
    pub fn new(config: PhotoSyncConfig, registry: Arc<dyn AssetRegistry>) -> Self {
        Self {
            config,
            registry,
            http_client: None,
            clock: Arc::new(SystemClock),
            artifacts: Arc::new(NoopArtifactGenerator),
            isolation: None,
            active_syncs: Arc::new(Mutex::new(HashSet::new())),
            logger: TaggedLogger::component("Main"),
        }
    }

    /// HTTP stack for backends that need one (GitHub).
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_artifact_generator(mut self, artifacts: Arc<dyn ArtifactGenerator>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Worker binary used in cluster mode. Located next to the current
    /// executable when not set.
    pub fn with_worker_program(mut self, isolation: ProcessIsolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn config(&self) -> &PhotoSyncConfig {
        &self.config
    }

    pub async fn is_syncing(&self, tenant_id: &str) -> bool {
        self.active_syncs.lock().await.contains(tenant_id)
    }

    async fn acquire(&self, tenant_id: &str) -> Result<()> {
        let mut active_syncs = self.active_syncs.lock().await;
        if !active_syncs.insert(tenant_id.to_string()) {
            return Err(SyncError::SyncInProgress {
                tenant_id: tenant_id.to_string(),
            });
        }
        Ok(())
    }

    async fn release(&self, tenant_id: &str) {
        self.active_syncs.lock().await.remove(tenant_id);
    }

    /// Run one sync for the configured tenant.
    ///
    /// # Errors
    ///
    /// Configuration, connection, listing and registry failures fail the
    /// run with nothing written. Per-object failures do not; they are listed
    /// in [`SyncReport::failures`].
    #[instrument(skip(self, request), fields(tenant = %self.config.tenant_id(), dry_run = request.dry_run))]
    pub async fn run(&self, request: RunSyncRequest) -> Result<SyncReport> {
        let config = self.config.with_overrides(
            request.builder_config.as_ref(),
            request.storage_config.as_ref(),
        )?;
        let tenant_id = config.tenant_id().to_string();

        self.acquire(&tenant_id).await?;
        let result = self.execute_run(&config, request.dry_run).await;
        self.release(&tenant_id).await;
        result
    }

    async fn execute_run(&self, config: &PhotoSyncConfig, dry_run: bool) -> Result<SyncReport> {
        let started_at = self.clock.now();

        let storage: Arc<dyn StorageBackend> = Arc::new(
            TenantScopedAdapter::connect(&config.storage, self.http_client.clone()).await?,
        );
        let scope = AssetScope::new(config.tenant_id(), storage.provider());
        let mut report = SyncReport::new(
            &scope.tenant_id,
            &scope.storage_provider,
            dry_run,
            started_at,
        );

        // Phase 1: List and classify
        info!("Phase 1: Listing objects for {}", scope);
        let engine = SyncEngine::new(
            Arc::clone(&storage),
            Arc::clone(&self.registry),
            scope.clone(),
            config.processing.clone(),
        )
        .with_logger(self.logger.child("Sync"));
        let plan = engine.plan().await?;
        report.unchanged = plan.unchanged;
        report.skipped = plan.skipped;

        // Phase 2: Process changed objects
        info!("Phase 2: Processing {} objects", plan.units.len());
        let extractor = MetadataExtractor::new(Arc::clone(&self.clock))
            .with_options(ExtractionOptions::from(&config.processing));
        let max_downloads = storage
            .download_concurrency()
            .unwrap_or(config.processing.default_concurrency);
        let processor = Arc::new(AssetProcessor::new(
            Arc::clone(&storage),
            extractor,
            Arc::clone(&self.artifacts),
            max_downloads,
        ));
        let mut orchestrator = Orchestrator::new(processor, config.worker.clone())
            .with_logger(self.logger.child("Orchestrator"));
        if config.worker.use_cluster_mode {
            let isolation = match &self.isolation {
                Some(isolation) => isolation.clone(),
                None => ProcessIsolation::locate()?,
            };
            if self.artifacts.worker_spec().is_none() {
                self.logger.debug(format_args!(
                    "Artifact generator has no worker form; generating in the parent"
                ));
            }
            orchestrator = orchestrator.with_isolation(isolation);
        }
        let outcomes = orchestrator.run(plan.units).await;

        // Phase 3: Settle classifications
        info!("Phase 3: Classifying {} outcomes", outcomes.len());
        let mut batch = AssetWriteBatch::default();
        for outcome in outcomes {
            let unit = outcome.unit;
            let manifest = match outcome.result {
                Ok(manifest) => unit.keep_recorded_date(manifest),
                Err(e) => {
                    report.failures.push(ProcessingFailure {
                        key: unit.key().to_string(),
                        cause: e.to_string(),
                    });
                    continue;
                }
            };

            let kind = unit.classify(&manifest);
            let changed = ChangedAsset {
                key: unit.key().to_string(),
                manifest: manifest.clone(),
            };
            match kind {
                ChangeKind::Unchanged => report.unchanged.push(changed.key),
                ChangeKind::New => {
                    batch.upserts.push(self.synced_record(
                        &scope,
                        storage.as_ref(),
                        &unit,
                        manifest,
                        started_at,
                    ));
                    report.new.push(changed);
                }
                ChangeKind::Updated => {
                    batch.upserts.push(self.synced_record(
                        &scope,
                        storage.as_ref(),
                        &unit,
                        manifest,
                        started_at,
                    ));
                    report.updated.push(changed);
                }
                ChangeKind::Conflict => {
                    if let Some(record) = conflict_record(&unit, manifest, started_at) {
                        batch.upserts.push(record);
                    }
                    report.conflicts.push(changed);
                }
                ChangeKind::Removed => {}
            }
        }
        report.unchanged.sort();

        for record in &plan.removed {
            self.logger
                .info(format_args!("Retiring {} (no longer listed)", record.storage_key));
            batch.removals.push(record.storage_key.clone());
            report.removed.push(record.storage_key.clone());
        }

        // Phase 4: Persist
        if dry_run {
            info!("Phase 4: Dry run, skipping {} registry writes", batch.len());
        } else if !batch.is_empty() {
            info!("Phase 4: Writing {} registry changes", batch.len());
            self.registry.apply_batch(&scope, &batch).await?;
            report.writes = batch.len();
        }

        report.finished_at = self.clock.now();
        self.logger.info(format_args!(
            "Sync {}{}: {} new, {} updated, {} conflicts, {} removed, {} unchanged, {} failed",
            scope,
            if dry_run { " (dry run)" } else { "" },
            report.new.len(),
            report.updated.len(),
            report.conflicts.len(),
            report.removed.len(),
            report.unchanged.len(),
            report.failures.len()
        ));
        Ok(report)
    }

    fn synced_record(
        &self,
        scope: &AssetScope,
        storage: &dyn StorageBackend,
        unit: &WorkUnit,
        manifest: AssetManifest,
        now: DateTime<Utc>,
    ) -> AssetRecord {
        let created_at = unit.existing.as_ref().map_or(now, |r| r.created_at);
        AssetRecord {
            tenant_id: scope.tenant_id.clone(),
            storage_provider: scope.storage_provider.clone(),
            storage_key: unit.key().to_string(),
            manifest,
            sync_status: SyncStatus::Synced,
            size: unit.object.size,
            etag: unit.object.etag.clone(),
            public_url: storage.generate_public_url(unit.key()),
            conflict: None,
            synced_at: Some(now),
            created_at,
            updated_at: now,
        }
    }

    /// Resolve open conflicts for the configured tenant.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownStrategy`] for a missing or unknown strategy and
    /// [`SyncError::ConflictNotFound`] for a targeted key without an open
    /// conflict. Either way no record changes.
    #[instrument(skip(self, request), fields(tenant = %self.config.tenant_id(), dry_run = request.dry_run))]
    pub async fn resolve_conflicts(
        &self,
        request: ResolveConflictRequest,
    ) -> Result<ResolutionReport> {
        let strategy = ResolutionStrategy::parse(request.strategy.as_deref(), request.merge)?;
        let config = self.config.with_overrides(
            request.builder_config.as_ref(),
            request.storage_config.as_ref(),
        )?;
        let tenant_id = config.tenant_id().to_string();
        let scope = AssetScope::new(&tenant_id, config.storage.upstream.provider_name());

        self.acquire(&tenant_id).await?;
        let resolver = ConflictResolver::new(Arc::clone(&self.registry), Arc::clone(&self.clock))
            .with_logger(self.logger.child("Conflicts"));
        let result = resolver
            .resolve(&scope, &strategy, request.keys.as_deref(), request.dry_run)
            .await;
        self.release(&tenant_id).await;
        result
    }
}

/// Registry record for a conflict: the registry manifest stays, the remote
/// side is parked in the payload.
fn conflict_record(
    unit: &WorkUnit,
    remote_manifest: AssetManifest,
    now: DateTime<Utc>,
) -> Option<AssetRecord> {
    let existing = unit.existing.as_ref()?;
    let reason = match existing.sync_status {
        SyncStatus::Conflict => "remote changed again before the conflict was resolved",
        _ => "remote changed while a registry edit was pending",
    };
    Some(AssetRecord {
        sync_status: SyncStatus::Conflict,
        conflict: Some(ConflictPayload {
            remote_manifest,
            remote_size: unit.object.size,
            remote_etag: unit.object.etag.clone(),
            reason: reason.to_string(),
            detected_at: now,
        }),
        updated_at: now,
        ..existing.clone()
    })
}
