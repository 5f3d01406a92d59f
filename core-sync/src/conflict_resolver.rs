//! Conflict Resolution
//!
//! Settles records left at `conflict` by a sync run.
//!
//! ## Strategies
//!
//! - **prefer-remote**: take the manifest computed from the remote object
//! - **prefer-local**: keep the registry manifest
//! - **manual-merge**: combine both field by field per a [`MergePlan`]
//!
//! One strategy applies to the whole conflict set. Every resolved record
//! becomes `synced`, takes the remote size and etag (so the next run sees it
//! as unchanged) and drops its conflict payload. All records are written in
//! one batch: either every target is resolved or none is.
//!
//! ## Usage
//!
//! ```ignore
//! let strategy = ResolutionStrategy::parse(Some("prefer-remote"), None)?;
//! let report = resolver.resolve(&scope, &strategy, None, false).await?;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use bridge_traits::Clock;
use core_library::{
    AssetManifest, AssetRecord, AssetRegistry, AssetScope, AssetWriteBatch, ConflictPayload,
    SyncStatus,
};
use core_runtime::config::{FieldSide, MergePlan, TagMerge};
use core_runtime::logging::TaggedLogger;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStrategy {
    PreferRemote,
    PreferLocal,
    ManualMerge(MergePlan),
}

impl ResolutionStrategy {
    /// Parse an operator-supplied strategy name.
    ///
    /// Kebab, snake and camel spellings are accepted. `merge` is only used by
    /// `manual-merge`; the default plan applies when it is absent.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownStrategy`] for a missing or unrecognised name.
    pub fn parse(name: Option<&str>, merge: Option<MergePlan>) -> Result<Self> {
        let name = name.map(str::trim).unwrap_or_default();
        match name {
            "prefer-remote" | "prefer_remote" | "preferRemote" => Ok(Self::PreferRemote),
            "prefer-local" | "prefer_local" | "preferLocal" => Ok(Self::PreferLocal),
            "manual-merge" | "manual_merge" | "manualMerge" => {
                Ok(Self::ManualMerge(merge.unwrap_or_default()))
            }
            "" => Err(SyncError::UnknownStrategy("<missing>".to_string())),
            other => Err(SyncError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PreferRemote => "prefer-remote",
            Self::PreferLocal => "prefer-local",
            Self::ManualMerge(_) => "manual-merge",
        }
    }

    /// Manifest to keep for a record given its conflict payload.
    pub fn resolve_manifest(&self, local: &AssetManifest, remote: &AssetManifest) -> AssetManifest {
        match self {
            Self::PreferRemote => remote.clone(),
            Self::PreferLocal => local.clone(),
            Self::ManualMerge(plan) => merge_manifests(plan, local, remote),
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn pick<'a, T>(side: FieldSide, local: &'a T, remote: &'a T) -> &'a T {
    match side {
        FieldSide::Local => local,
        FieldSide::Remote => remote,
    }
}

fn merge_manifests(plan: &MergePlan, local: &AssetManifest, remote: &AssetManifest) -> AssetManifest {
    let tags: BTreeSet<String> = match plan.tags {
        TagMerge::Local => local.tags.clone(),
        TagMerge::Remote => remote.tags.clone(),
        TagMerge::Union => local.tags.union(&remote.tags).cloned().collect(),
    };

    AssetManifest {
        photo_id: remote.photo_id.clone(),
        title: pick(plan.title, &local.title, &remote.title).clone(),
        description: pick(plan.description, &local.description, &remote.description).clone(),
        tags,
        date_taken: *pick(plan.date_taken, &local.date_taken, &remote.date_taken),
        live_photo_key: pick(plan.live_photo, &local.live_photo_key, &remote.live_photo_key)
            .clone(),
        digest: pick(plan.digest, &local.digest, &remote.digest).clone(),
        artifacts: remote.artifacts.clone(),
    }
}

/// One settled record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAsset {
    pub key: String,
    pub manifest: AssetManifest,
}

/// Outcome of one resolve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub tenant_id: String,
    pub storage_provider: String,
    pub strategy: String,
    pub dry_run: bool,
    pub resolved: Vec<ResolvedAsset>,
}

pub struct ConflictResolver {
    registry: Arc<dyn AssetRegistry>,
    clock: Arc<dyn Clock>,
    logger: TaggedLogger,
}

impl ConflictResolver {
    pub fn new(registry: Arc<dyn AssetRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            clock,
            logger: TaggedLogger::component("Conflicts"),
        }
    }

    pub fn with_logger(mut self, logger: TaggedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Resolve `keys` (every open conflict when `None`) with `strategy`.
    ///
    /// # Errors
    ///
    /// [`SyncError::ConflictNotFound`] when a requested key is missing or not
    /// in conflict. Nothing is written on any error.
    #[instrument(skip(self, strategy, keys), fields(scope = %scope, strategy = %strategy))]
    pub async fn resolve(
        &self,
        scope: &AssetScope,
        strategy: &ResolutionStrategy,
        keys: Option<&[String]>,
        dry_run: bool,
    ) -> Result<ResolutionReport> {
        let targets = self.load_targets(scope, keys).await?;
        let now = self.clock.now();

        let mut batch = AssetWriteBatch::default();
        let mut resolved = Vec::with_capacity(targets.len());

        for (record, conflict) in targets {
            let manifest = strategy.resolve_manifest(&record.manifest, &conflict.remote_manifest);
            resolved.push(ResolvedAsset {
                key: record.storage_key.clone(),
                manifest: manifest.clone(),
            });
            batch.upserts.push(AssetRecord {
                manifest,
                sync_status: SyncStatus::Synced,
                size: conflict.remote_size,
                etag: conflict.remote_etag,
                conflict: None,
                synced_at: Some(now),
                updated_at: now,
                ..record
            });
        }

        if dry_run {
            self.logger.info(format_args!(
                "Dry run: would resolve {} conflicts with {}",
                resolved.len(),
                strategy
            ));
        } else if !batch.is_empty() {
            self.registry.apply_batch(scope, &batch).await?;
            self.logger.info(format_args!(
                "Resolved {} conflicts with {}",
                resolved.len(),
                strategy
            ));
        }

        Ok(ResolutionReport {
            tenant_id: scope.tenant_id.clone(),
            storage_provider: scope.storage_provider.clone(),
            strategy: strategy.name().to_string(),
            dry_run,
            resolved,
        })
    }

    async fn load_targets(
        &self,
        scope: &AssetScope,
        keys: Option<&[String]>,
    ) -> Result<Vec<(AssetRecord, ConflictPayload)>> {
        let records = match keys {
            None => {
                self.registry
                    .list_by_status(scope, SyncStatus::Conflict)
                    .await?
            }
            Some(keys) => {
                let mut records = Vec::with_capacity(keys.len());
                for key in keys {
                    let record = self
                        .registry
                        .find(scope, key)
                        .await?
                        .ok_or_else(|| SyncError::ConflictNotFound { key: key.clone() })?;
                    records.push(record);
                }
                records
            }
        };

        records
            .into_iter()
            .map(|mut record| match (record.sync_status, record.conflict.take()) {
                (SyncStatus::Conflict, Some(conflict)) => Ok((record, conflict)),
                _ => Err(SyncError::ConflictNotFound {
                    key: record.storage_key,
                }),
            })
            .collect()
    }
}
