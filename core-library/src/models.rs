//! Domain models for the photo asset registry
//!
//! An [`AssetRecord`] is the persisted state of one storage key for one tenant
//! and backend. Its [`AssetManifest`] is the canonical metadata derived from
//! the object; it is replaced wholesale, never patched field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;

// =============================================================================
// Scope
// =============================================================================

/// The (tenant, backend) pair every registry operation is confined to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScope {
    pub tenant_id: String,
    pub storage_provider: String,
}

impl AssetScope {
    pub fn new(tenant_id: impl Into<String>, storage_provider: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            storage_provider: storage_provider.into(),
        }
    }
}

impl fmt::Display for AssetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tenant_id, self.storage_provider)
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// Canonical metadata of one photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    /// Stable id derived from the key (basename plus optional digest suffix).
    pub photo_id: String,
    pub title: String,
    pub date_taken: DateTime<Utc>,
    /// Set semantics; ordered so serialized manifests are stable.
    pub tags: BTreeSet<String>,
    pub description: String,
    /// Key of the paired motion clip for live photos.
    #[serde(default)]
    pub live_photo_key: Option<String>,
    /// Hex SHA-256 of the object bytes.
    #[serde(default)]
    pub digest: Option<String>,
    /// Opaque outputs of the artifact generator (thumbnail key, blurhash, ...).
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

impl AssetManifest {
    pub fn validate(&self) -> Result<(), String> {
        if self.photo_id.trim().is_empty() {
            return Err("Manifest photo id cannot be empty".to_string());
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err("Manifest tags cannot be empty strings".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Status
// =============================================================================

/// Sync state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Edited on the registry side; the edit has not been reconciled with
    /// remote state yet.
    Pending,
    Synced,
    /// Remote and registry diverged and need an operator decision.
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "conflict" => Ok(SyncStatus::Conflict),
            other => Err(LibraryError::InvalidInput {
                field: "sync_status".to_string(),
                message: format!("unknown status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Remote side of a conflict, kept until the conflict is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPayload {
    pub remote_manifest: AssetManifest,
    pub remote_size: u64,
    #[serde(default)]
    pub remote_etag: Option<String>,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

/// Persisted state of one storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub tenant_id: String,
    pub storage_provider: String,
    /// Tenant-relative key; never contains the tenant segment.
    pub storage_key: String,
    pub manifest: AssetManifest,
    pub sync_status: SyncStatus,
    pub size: u64,
    /// Backend content hash observed at the last sync.
    pub etag: Option<String>,
    pub public_url: String,
    pub conflict: Option<ConflictPayload>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    pub fn scope(&self) -> AssetScope {
        AssetScope::new(&self.tenant_id, &self.storage_provider)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.trim().is_empty() {
            return Err("Asset tenant id cannot be empty".to_string());
        }
        if self.storage_key.trim().is_empty() {
            return Err("Asset storage key cannot be empty".to_string());
        }
        if self.storage_key.starts_with('/') {
            return Err(format!(
                "Asset storage key '{}' must be relative",
                self.storage_key
            ));
        }
        match (self.sync_status, &self.conflict) {
            (SyncStatus::Conflict, None) => {
                return Err("Conflict record is missing its conflict payload".to_string())
            }
            (SyncStatus::Synced | SyncStatus::Pending, Some(_)) => {
                return Err(format!(
                    "Record with status {} cannot carry a conflict payload",
                    self.sync_status
                ))
            }
            _ => {}
        }
        self.manifest.validate()
    }
}

/// Per-tenant counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub total: u64,
    pub synced: u64,
    pub conflicts: u64,
    pub pending: u64,
}

/// Writes applied in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetWriteBatch {
    pub upserts: Vec<AssetRecord>,
    /// Keys to retire within the batch scope.
    pub removals: Vec<String>,
}

impl AssetWriteBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_sync_status_round_trips_through_str() {
        for status in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Conflict] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_record_validation() {
        assert!(record("t1", "2024/a.jpg", SyncStatus::Synced).validate().is_ok());
        assert!(record("t1", "2024/a.jpg", SyncStatus::Conflict).validate().is_ok());

        let mut absolute = record("t1", "a.jpg", SyncStatus::Synced);
        absolute.storage_key = "/t1/a.jpg".to_string();
        assert!(absolute.validate().is_err());

        let mut missing_payload = record("t1", "a.jpg", SyncStatus::Synced);
        missing_payload.sync_status = SyncStatus::Conflict;
        assert!(missing_payload.validate().is_err());

        let mut stale_payload = record("t1", "a.jpg", SyncStatus::Conflict);
        stale_payload.sync_status = SyncStatus::Synced;
        assert!(stale_payload.validate().is_err());
    }

    #[test]
    fn test_manifest_serializes_camel_case_with_sorted_tags() {
        let mut manifest = record("t1", "a.jpg", SyncStatus::Synced).manifest;
        manifest.tags = ["sunset", "beach"].iter().map(|s| s.to_string()).collect();
        let json = serde_json::to_value(&manifest).unwrap();

        assert!(json.get("photoId").is_some());
        assert!(json.get("dateTaken").is_some());
        assert_eq!(json["tags"], serde_json::json!(["beach", "sunset"]));
        assert!(json.get("views").is_none());
    }

    #[test]
    fn test_stored_manifest_with_view_count_still_loads() {
        let manifest = record("t1", "a.jpg", SyncStatus::Synced).manifest;
        let mut json = serde_json::to_value(&manifest).unwrap();
        json["views"] = serde_json::json!(120);

        let loaded: AssetManifest = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, manifest);
    }
}
