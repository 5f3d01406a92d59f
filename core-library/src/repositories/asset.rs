//! Asset registry trait and SQLite implementation

use crate::error::{LibraryError, Result};
use crate::models::{
    AssetManifest, AssetRecord, AssetScope, AssetSummary, AssetWriteBatch, ConflictPayload,
    SyncStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::{debug, instrument};

/// Authoritative store of per-tenant asset records.
///
/// Every method is confined to one [`AssetScope`]; a record of another tenant
/// or backend is never read or written.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    /// Find a record by key
    ///
    /// # Returns
    /// - `Ok(Some(record))` if found
    /// - `Ok(None)` if not found
    async fn find(&self, scope: &AssetScope, storage_key: &str) -> Result<Option<AssetRecord>>;

    /// All records in scope, ordered by key.
    async fn list(&self, scope: &AssetScope) -> Result<Vec<AssetRecord>>;

    /// Records in scope with the given status, ordered by key.
    async fn list_by_status(
        &self,
        scope: &AssetScope,
        status: SyncStatus,
    ) -> Result<Vec<AssetRecord>>;

    /// Insert or replace one record.
    ///
    /// # Errors
    /// Returns error if the record fails validation or the write fails.
    async fn upsert(&self, record: &AssetRecord) -> Result<()>;

    /// Apply upserts and removals in a single transaction.
    ///
    /// # Errors
    /// Returns error if any record fails validation, belongs to another scope,
    /// or any statement fails; nothing is written in that case.
    async fn apply_batch(&self, scope: &AssetScope, batch: &AssetWriteBatch) -> Result<()>;

    /// Delete one record.
    ///
    /// # Returns
    /// - `Ok(true)` if the record was deleted
    /// - `Ok(false)` if it did not exist
    async fn delete(&self, scope: &AssetScope, storage_key: &str) -> Result<bool>;

    /// Store an operator edit of a record's manifest and mark it pending.
    ///
    /// # Returns
    /// `Ok(false)` if the record does not exist.
    async fn record_local_edit(
        &self,
        scope: &AssetScope,
        storage_key: &str,
        manifest: &AssetManifest,
    ) -> Result<bool>;

    /// Counts by status.
    async fn summary(&self, scope: &AssetScope) -> Result<AssetSummary>;
}

#[derive(FromRow)]
struct AssetRow {
    tenant_id: String,
    storage_provider: String,
    storage_key: String,
    manifest: String,
    sync_status: String,
    size: i64,
    etag: Option<String>,
    public_url: String,
    conflict: Option<String>,
    synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

fn millis_to_datetime(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| LibraryError::InvalidInput {
        field: column.to_string(),
        message: format!("timestamp {} out of range", millis),
    })
}

impl TryFrom<AssetRow> for AssetRecord {
    type Error = LibraryError;

    fn try_from(row: AssetRow) -> Result<Self> {
        let manifest: AssetManifest =
            serde_json::from_str(&row.manifest).map_err(|source| LibraryError::Serialization {
                column: "manifest",
                source,
            })?;
        let conflict: Option<ConflictPayload> = row
            .conflict
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|source| LibraryError::Serialization {
                column: "conflict",
                source,
            })?;

        Ok(AssetRecord {
            tenant_id: row.tenant_id,
            storage_provider: row.storage_provider,
            storage_key: row.storage_key,
            manifest,
            sync_status: row.sync_status.parse()?,
            size: u64::try_from(row.size).map_err(|_| LibraryError::InvalidInput {
                field: "size".to_string(),
                message: format!("negative size {}", row.size),
            })?,
            etag: row.etag,
            public_url: row.public_url,
            conflict,
            synced_at: row
                .synced_at
                .map(|ms| millis_to_datetime("synced_at", ms))
                .transpose()?,
            created_at: millis_to_datetime("created_at", row.created_at)?,
            updated_at: millis_to_datetime("updated_at", row.updated_at)?,
        })
    }
}

/// SQLite implementation of [`AssetRegistry`]
pub struct SqliteAssetRegistry {
    pool: SqlitePool,
}

impl SqliteAssetRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn validate(record: &AssetRecord) -> Result<()> {
        record
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: format!("asset {}", record.storage_key),
                message,
            })
    }

    async fn upsert_in(tx: &mut Transaction<'_, Sqlite>, record: &AssetRecord) -> Result<()> {
        let manifest =
            serde_json::to_string(&record.manifest).map_err(|source| {
                LibraryError::Serialization {
                    column: "manifest",
                    source,
                }
            })?;
        let conflict = record
            .conflict
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| LibraryError::Serialization {
                column: "conflict",
                source,
            })?;

        sqlx::query(
            r#"
            INSERT INTO photo_assets (
                tenant_id, storage_provider, storage_key, manifest, sync_status,
                size, etag, public_url, conflict, synced_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, storage_provider, storage_key) DO UPDATE SET
                manifest = excluded.manifest,
                sync_status = excluded.sync_status,
                size = excluded.size,
                etag = excluded.etag,
                public_url = excluded.public_url,
                conflict = excluded.conflict,
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.tenant_id)
        .bind(&record.storage_provider)
        .bind(&record.storage_key)
        .bind(manifest)
        .bind(record.sync_status.as_str())
        .bind(i64::try_from(record.size).unwrap_or(i64::MAX))
        .bind(&record.etag)
        .bind(&record.public_url)
        .bind(conflict)
        .bind(record.synced_at.map(|t| t.timestamp_millis()))
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    fn rows_to_records(rows: Vec<AssetRow>) -> Result<Vec<AssetRecord>> {
        rows.into_iter().map(AssetRecord::try_from).collect()
    }
}

#[async_trait]
impl AssetRegistry for SqliteAssetRegistry {
    async fn find(&self, scope: &AssetScope, storage_key: &str) -> Result<Option<AssetRecord>> {
        let row = sqlx::query_as::<_, AssetRow>(
            "SELECT * FROM photo_assets WHERE tenant_id = ? AND storage_provider = ? AND storage_key = ?",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.storage_provider)
        .bind(storage_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AssetRecord::try_from).transpose()
    }

    async fn list(&self, scope: &AssetScope) -> Result<Vec<AssetRecord>> {
        let rows = sqlx::query_as::<_, AssetRow>(
            "SELECT * FROM photo_assets WHERE tenant_id = ? AND storage_provider = ? ORDER BY storage_key",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.storage_provider)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn list_by_status(
        &self,
        scope: &AssetScope,
        status: SyncStatus,
    ) -> Result<Vec<AssetRecord>> {
        let rows = sqlx::query_as::<_, AssetRow>(
            r#"
            SELECT * FROM photo_assets
            WHERE tenant_id = ? AND storage_provider = ? AND sync_status = ?
            ORDER BY storage_key
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.storage_provider)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn upsert(&self, record: &AssetRecord) -> Result<()> {
        self.apply_batch(
            &record.scope(),
            &AssetWriteBatch {
                upserts: vec![record.clone()],
                removals: Vec::new(),
            },
        )
        .await
    }

    #[instrument(skip(self, batch), fields(scope = %scope, upserts = batch.upserts.len(), removals = batch.removals.len()))]
    async fn apply_batch(&self, scope: &AssetScope, batch: &AssetWriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        for record in &batch.upserts {
            Self::validate(record)?;
            if record.scope() != *scope {
                return Err(LibraryError::InvalidInput {
                    field: format!("asset {}", record.storage_key),
                    message: format!("record scope {} outside batch scope {}", record.scope(), scope),
                });
            }
        }

        let mut tx = self.pool.begin().await?;

        for record in &batch.upserts {
            Self::upsert_in(&mut tx, record).await?;
        }

        for key in &batch.removals {
            sqlx::query(
                "DELETE FROM photo_assets WHERE tenant_id = ? AND storage_provider = ? AND storage_key = ?",
            )
            .bind(&scope.tenant_id)
            .bind(&scope.storage_provider)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Asset batch committed");
        Ok(())
    }

    async fn delete(&self, scope: &AssetScope, storage_key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM photo_assets WHERE tenant_id = ? AND storage_provider = ? AND storage_key = ?",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.storage_provider)
        .bind(storage_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_local_edit(
        &self,
        scope: &AssetScope,
        storage_key: &str,
        manifest: &AssetManifest,
    ) -> Result<bool> {
        manifest
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: format!("asset {}", storage_key),
                message,
            })?;
        let manifest = serde_json::to_string(manifest).map_err(|source| {
            LibraryError::Serialization {
                column: "manifest",
                source,
            }
        })?;

        // An edit on a conflicted record keeps it in conflict with the new local side
        let result = sqlx::query(
            r#"
            UPDATE photo_assets
            SET manifest = ?,
                sync_status = CASE sync_status WHEN 'conflict' THEN 'conflict' ELSE 'pending' END,
                updated_at = ?
            WHERE tenant_id = ? AND storage_provider = ? AND storage_key = ?
            "#,
        )
        .bind(manifest)
        .bind(Utc::now().timestamp_millis())
        .bind(&scope.tenant_id)
        .bind(&scope.storage_provider)
        .bind(storage_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn summary(&self, scope: &AssetScope) -> Result<AssetSummary> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT sync_status, COUNT(*) FROM photo_assets
            WHERE tenant_id = ? AND storage_provider = ?
            GROUP BY sync_status
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.storage_provider)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = AssetSummary::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match status.parse::<SyncStatus>()? {
                SyncStatus::Pending => summary.pending = count,
                SyncStatus::Synced => summary.synced = count,
                SyncStatus::Conflict => summary.conflicts = count,
            }
            summary.total += count;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::fixtures::record;

    async fn registry() -> SqliteAssetRegistry {
        SqliteAssetRegistry::new(create_test_pool().await.unwrap())
    }

    fn scope(tenant: &str) -> AssetScope {
        AssetScope::new(tenant, "s3")
    }

    #[core_async::test]
    async fn test_upsert_and_find() {
        let registry = registry().await;
        let record = record("t1", "2024/a.jpg", SyncStatus::Synced);

        registry.upsert(&record).await.unwrap();

        let found = registry.find(&scope("t1"), "2024/a.jpg").await.unwrap();
        assert_eq!(found, Some(record));
        assert!(registry.find(&scope("t2"), "2024/a.jpg").await.unwrap().is_none());
    }

    fn row(size: i64) -> AssetRow {
        AssetRow {
            tenant_id: "t1".to_string(),
            storage_provider: "s3".to_string(),
            storage_key: "a.jpg".to_string(),
            manifest: serde_json::to_string(&record("t1", "a.jpg", SyncStatus::Synced).manifest)
                .unwrap(),
            sync_status: "synced".to_string(),
            size,
            etag: None,
            public_url: String::new(),
            conflict: None,
            synced_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_negative_size_is_rejected_not_zeroed() {
        assert_eq!(AssetRecord::try_from(row(2048)).unwrap().size, 2048);

        let result = AssetRecord::try_from(row(-1));
        assert!(matches!(
            result,
            Err(LibraryError::InvalidInput { ref field, .. }) if field == "size"
        ));
    }

    #[core_async::test]
    async fn test_upsert_replaces_whole_record() {
        let registry = registry().await;
        let mut record = record("t1", "a.jpg", SyncStatus::Synced);
        registry.upsert(&record).await.unwrap();

        record.manifest.title = "new title".to_string();
        record.size = 9;
        registry.upsert(&record).await.unwrap();

        let found = registry.find(&scope("t1"), "a.jpg").await.unwrap().unwrap();
        assert_eq!(found.manifest.title, "new title");
        assert_eq!(found.size, 9);
        assert_eq!(registry.list(&scope("t1")).await.unwrap().len(), 1);
    }

    #[core_async::test]
    async fn test_conflict_payload_round_trips() {
        let registry = registry().await;
        let record = record("t1", "c.jpg", SyncStatus::Conflict);
        registry.upsert(&record).await.unwrap();

        let conflicts = registry
            .list_by_status(&scope("t1"), SyncStatus::Conflict)
            .await
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict, record.conflict);
    }

    #[core_async::test]
    async fn test_apply_batch_is_atomic() {
        let registry = registry().await;
        registry
            .upsert(&record("t1", "keep.jpg", SyncStatus::Synced))
            .await
            .unwrap();

        let mut invalid = record("t1", "bad.jpg", SyncStatus::Synced);
        invalid.sync_status = SyncStatus::Conflict;
        let batch = AssetWriteBatch {
            upserts: vec![record("t1", "new.jpg", SyncStatus::Synced), invalid],
            removals: vec!["keep.jpg".to_string()],
        };

        assert!(registry.apply_batch(&scope("t1"), &batch).await.is_err());

        let keys: Vec<_> = registry
            .list(&scope("t1"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.storage_key)
            .collect();
        assert_eq!(keys, vec!["keep.jpg"]);
    }

    #[core_async::test]
    async fn test_apply_batch_rejects_foreign_scope() {
        let registry = registry().await;
        let batch = AssetWriteBatch {
            upserts: vec![record("t2", "a.jpg", SyncStatus::Synced)],
            removals: Vec::new(),
        };

        let result = registry.apply_batch(&scope("t1"), &batch).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
        assert!(registry.list(&scope("t2")).await.unwrap().is_empty());
    }

    #[core_async::test]
    async fn test_apply_batch_upserts_and_removes() {
        let registry = registry().await;
        registry
            .upsert(&record("t1", "old.jpg", SyncStatus::Synced))
            .await
            .unwrap();

        let batch = AssetWriteBatch {
            upserts: vec![record("t1", "new.jpg", SyncStatus::Synced)],
            removals: vec!["old.jpg".to_string()],
        };
        registry.apply_batch(&scope("t1"), &batch).await.unwrap();

        let records = registry.list(&scope("t1")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].storage_key, "new.jpg");
    }

    #[core_async::test]
    async fn test_record_local_edit_marks_pending() {
        let registry = registry().await;
        let record = record("t1", "a.jpg", SyncStatus::Synced);
        registry.upsert(&record).await.unwrap();

        let mut edited = record.manifest.clone();
        edited.title = "Operator title".to_string();
        assert!(registry
            .record_local_edit(&scope("t1"), "a.jpg", &edited)
            .await
            .unwrap());
        assert!(!registry
            .record_local_edit(&scope("t1"), "missing.jpg", &edited)
            .await
            .unwrap());

        let found = registry.find(&scope("t1"), "a.jpg").await.unwrap().unwrap();
        assert_eq!(found.sync_status, SyncStatus::Pending);
        assert_eq!(found.manifest.title, "Operator title");
    }

    #[core_async::test]
    async fn test_summary_counts_by_status() {
        let registry = registry().await;
        for (key, status) in [
            ("a.jpg", SyncStatus::Synced),
            ("b.jpg", SyncStatus::Synced),
            ("c.jpg", SyncStatus::Conflict),
            ("d.jpg", SyncStatus::Pending),
        ] {
            registry.upsert(&record("t1", key, status)).await.unwrap();
        }
        registry
            .upsert(&record("t2", "z.jpg", SyncStatus::Synced))
            .await
            .unwrap();

        let summary = registry.summary(&scope("t1")).await.unwrap();
        assert_eq!(
            summary,
            AssetSummary {
                total: 4,
                synced: 2,
                conflicts: 1,
                pending: 1,
            }
        );
    }

    #[core_async::test]
    async fn test_delete() {
        let registry = registry().await;
        registry
            .upsert(&record("t1", "a.jpg", SyncStatus::Synced))
            .await
            .unwrap();

        assert!(registry.delete(&scope("t1"), "a.jpg").await.unwrap());
        assert!(!registry.delete(&scope("t1"), "a.jpg").await.unwrap());
    }
}
