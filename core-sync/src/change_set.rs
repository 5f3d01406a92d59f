//! Change-set types produced by a sync run

use bridge_traits::storage::StorageObject;
use chrono::{DateTime, Utc};
use core_library::{AssetManifest, AssetRecord, SyncStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of one storage key for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    New,
    Unchanged,
    Updated,
    Conflict,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::New => "new",
            ChangeKind::Unchanged => "unchanged",
            ChangeKind::Updated => "updated",
            ChangeKind::Conflict => "conflict",
            ChangeKind::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// One listed object that needs processing.
///
/// Built by the listing phase for new keys and for candidates whose listing
/// data (or record state) no longer matches the registry.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub object: StorageObject,
    /// Motion clip paired with this still, if any.
    pub live_photo: Option<StorageObject>,
    /// Registry state before the run; `None` for new keys.
    pub existing: Option<AssetRecord>,
}

impl WorkUnit {
    pub fn key(&self) -> &str {
        &self.object.key
    }

    pub fn live_photo_key(&self) -> Option<String> {
        self.live_photo.as_ref().map(|o| o.key.clone())
    }

    /// Remote manifest and size as of the last sync, if known.
    ///
    /// For a pending record the manifest is the local edit, whose digest
    /// still names the bytes last synced.
    fn recorded_remote(&self) -> Option<(&AssetManifest, u64)> {
        let existing = self.existing.as_ref()?;
        match existing.sync_status {
            SyncStatus::Synced | SyncStatus::Pending => Some((&existing.manifest, existing.size)),
            SyncStatus::Conflict => existing
                .conflict
                .as_ref()
                .map(|c| (&c.remote_manifest, c.remote_size)),
        }
    }

    /// Whether the remote bytes are the ones last recorded.
    fn remote_unchanged(&self, manifest: &AssetManifest) -> bool {
        self.recorded_remote().is_some_and(|(recorded, size)| {
            recorded.digest.is_some()
                && recorded.digest == manifest.digest
                && recorded.live_photo_key == manifest.live_photo_key
                && size == self.object.size
        })
    }

    /// Keep the recorded `date_taken` when the bytes are unchanged.
    ///
    /// Identical bytes under the same key give the same EXIF and filename
    /// dates, so a different date here came from the clock fallback.
    pub fn keep_recorded_date(&self, mut manifest: AssetManifest) -> AssetManifest {
        if let Some((recorded, _)) = self.recorded_remote() {
            if recorded.digest.is_some() && recorded.digest == manifest.digest {
                manifest.date_taken = recorded.date_taken;
            }
        }
        manifest
    }

    /// Final classification given the manifest computed for this unit.
    pub fn classify(&self, manifest: &AssetManifest) -> ChangeKind {
        let Some(existing) = &self.existing else {
            return ChangeKind::New;
        };
        let same_content = existing.manifest == *manifest && existing.size == self.object.size;
        match existing.sync_status {
            SyncStatus::Synced if same_content => ChangeKind::Unchanged,
            SyncStatus::Synced => ChangeKind::Updated,
            SyncStatus::Pending if same_content || self.remote_unchanged(manifest) => {
                ChangeKind::Unchanged
            }
            // Remote caught up with the conflicting edit; nothing left to resolve.
            SyncStatus::Conflict if same_content => ChangeKind::Updated,
            SyncStatus::Conflict if self.remote_unchanged(manifest) => ChangeKind::Unchanged,
            SyncStatus::Pending | SyncStatus::Conflict => ChangeKind::Conflict,
        }
    }
}

/// A key with the manifest computed for it during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedAsset {
    pub key: String,
    pub manifest: AssetManifest,
}

/// Per-key processing failure. The record keeps its prior state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingFailure {
    pub key: String,
    pub cause: String,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub tenant_id: String,
    pub storage_provider: String,
    pub dry_run: bool,
    pub new: Vec<ChangedAsset>,
    pub updated: Vec<ChangedAsset>,
    pub conflicts: Vec<ChangedAsset>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
    /// Listed keys outside the supported formats.
    pub skipped: Vec<String>,
    pub failures: Vec<ProcessingFailure>,
    /// Registry rows written (0 for dry runs).
    pub writes: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn new(
        tenant_id: impl Into<String>,
        storage_provider: impl Into<String>,
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            storage_provider: storage_provider.into(),
            dry_run,
            new: Vec::new(),
            updated: Vec::new(),
            conflicts: Vec::new(),
            unchanged: Vec::new(),
            removed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            writes: 0,
            started_at,
            finished_at: started_at,
        }
    }

    /// Keys of the given kind, in report order.
    pub fn keys(&self, kind: ChangeKind) -> Vec<&str> {
        match kind {
            ChangeKind::New => self.new.iter().map(|a| a.key.as_str()).collect(),
            ChangeKind::Updated => self.updated.iter().map(|a| a.key.as_str()).collect(),
            ChangeKind::Conflict => self.conflicts.iter().map(|a| a.key.as_str()).collect(),
            ChangeKind::Unchanged => self.unchanged.iter().map(String::as_str).collect(),
            ChangeKind::Removed => self.removed.iter().map(String::as_str).collect(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !(self.new.is_empty()
            && self.updated.is_empty()
            && self.conflicts.is_empty()
            && self.removed.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_library::ConflictPayload;
    use std::collections::{BTreeMap, BTreeSet};

    fn manifest(title: &str) -> AssetManifest {
        AssetManifest {
            photo_id: "a".to_string(),
            title: title.to_string(),
            date_taken: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            tags: BTreeSet::new(),
            description: String::new(),
            live_photo_key: None,
            digest: Some("00".repeat(32)),
            artifacts: BTreeMap::new(),
        }
    }

    fn record(status: SyncStatus, title: &str) -> AssetRecord {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        AssetRecord {
            tenant_id: "t1".to_string(),
            storage_provider: "local".to_string(),
            storage_key: "a.jpg".to_string(),
            manifest: manifest(title),
            sync_status: status,
            size: 10,
            etag: None,
            public_url: String::new(),
            conflict: None,
            synced_at: Some(at),
            created_at: at,
            updated_at: at,
        }
    }

    fn unit(existing: Option<AssetRecord>) -> WorkUnit {
        WorkUnit {
            object: StorageObject::new("a.jpg", 10),
            live_photo: None,
            existing,
        }
    }

    fn with_payload(mut record: AssetRecord, remote: AssetManifest) -> AssetRecord {
        record.conflict = Some(ConflictPayload {
            remote_manifest: remote,
            remote_size: 10,
            remote_etag: None,
            reason: "test".to_string(),
            detected_at: record.updated_at,
        });
        record
    }

    #[test]
    fn test_classify() {
        let computed = manifest("a");
        let cases = [
            (None, ChangeKind::New),
            (Some(record(SyncStatus::Synced, "a")), ChangeKind::Unchanged),
            (Some(record(SyncStatus::Synced, "old")), ChangeKind::Updated),
            (Some(record(SyncStatus::Pending, "a")), ChangeKind::Unchanged),
            (Some(record(SyncStatus::Conflict, "edited")), ChangeKind::Conflict),
            (Some(record(SyncStatus::Conflict, "a")), ChangeKind::Updated),
        ];
        for (existing, expected) in cases {
            assert_eq!(unit(existing).classify(&computed), expected);
        }
    }

    #[test]
    fn test_pending_edit_conflicts_only_when_remote_bytes_moved() {
        let pending = unit(Some(record(SyncStatus::Pending, "edited")));
        assert_eq!(pending.classify(&manifest("a")), ChangeKind::Unchanged);

        let mut moved = manifest("a");
        moved.digest = Some("11".repeat(32));
        assert_eq!(pending.classify(&moved), ChangeKind::Conflict);

        let mut resized = unit(Some(record(SyncStatus::Pending, "edited")));
        resized.object.size = 12;
        assert_eq!(resized.classify(&manifest("a")), ChangeKind::Conflict);
    }

    #[test]
    fn test_open_conflict_compares_against_parked_remote() {
        let mut parked = manifest("a");
        parked.digest = Some("22".repeat(32));
        let open = unit(Some(with_payload(
            record(SyncStatus::Conflict, "edited"),
            parked.clone(),
        )));

        assert_eq!(open.classify(&parked), ChangeKind::Unchanged);
        assert_eq!(open.classify(&manifest("b")), ChangeKind::Conflict);
    }

    #[test]
    fn test_keep_recorded_date_for_same_bytes() {
        let existing = unit(Some(record(SyncStatus::Synced, "a")));
        let mut rederived = manifest("a");
        rederived.date_taken = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let kept = existing.keep_recorded_date(rederived.clone());
        assert_eq!(kept.date_taken, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(existing.classify(&kept), ChangeKind::Unchanged);

        rederived.digest = Some("33".repeat(32));
        let moved = existing.keep_recorded_date(rederived.clone());
        assert_eq!(moved.date_taken, rederived.date_taken);
        assert_eq!(unit(None).keep_recorded_date(rederived.clone()), rederived);
    }

    #[test]
    fn test_size_change_is_not_unchanged() {
        let mut unit = unit(Some(record(SyncStatus::Synced, "a")));
        unit.object.size = 11;
        assert_eq!(unit.classify(&manifest("a")), ChangeKind::Updated);
    }

    #[test]
    fn test_report_keys() {
        let mut report = SyncReport::new("t1", "local", false, Utc::now());
        assert!(!report.has_changes());
        report.removed.push("gone.jpg".to_string());
        report.new.push(ChangedAsset {
            key: "a.jpg".to_string(),
            manifest: manifest("a"),
        });
        assert_eq!(report.keys(ChangeKind::New), vec!["a.jpg"]);
        assert_eq!(report.keys(ChangeKind::Removed), vec!["gone.jpg"]);
        assert!(report.has_changes());
    }
}
