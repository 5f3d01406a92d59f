//! Tenant-scoped storage decorator
//!
//! [`TenantScopedAdapter`] wraps any [`StorageBackend`] so callers only ever
//! see keys relative to their own tenant root.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::HttpClient;
use bridge_traits::storage::{StorageBackend, StorageObject, UploadOptions};
use bytes::Bytes;
use core_runtime::config::ManagedStorageConfig;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::factory::create_backend;
use crate::path::{join_key, normalize_key};

/// How the effective prefix reaches the wrapped backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixStrategy {
    /// Prefix prepended to every inbound key and stripped from every
    /// outbound one (S3, OSS, COS).
    Manual,
    /// Prefix baked into the backend configuration; keys pass through
    /// normalized (GitHub, local).
    Native,
}

pub struct TenantScopedAdapter {
    inner: Arc<dyn StorageBackend>,
    prefix: String,
    strategy: PrefixStrategy,
}

impl TenantScopedAdapter {
    /// Build the upstream backend for `config` and confine it to the tenant.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when the tenant segment is empty or
    /// the upstream config is invalid.
    #[instrument(skip(config, http_client), fields(tenant = %config.tenant_id))]
    pub async fn connect(
        config: &ManagedStorageConfig,
        http_client: Option<Arc<dyn HttpClient>>,
    ) -> Result<Self> {
        let prefix = config.effective_prefix()?;
        let strategy = if config.upstream.is_natively_scoped() {
            PrefixStrategy::Native
        } else {
            PrefixStrategy::Manual
        };

        let scoped = config.upstream.scoped_to(&prefix);
        let inner = create_backend(&scoped, http_client).await?;

        debug!(
            "Scoped {} storage to '{}' ({:?})",
            inner.provider(),
            prefix,
            strategy
        );
        Ok(Self::from_parts(inner, prefix, strategy))
    }

    /// Wrap an already-built backend.
    ///
    /// With [`PrefixStrategy::Native`] the backend must already be rooted at
    /// `prefix`.
    pub fn from_parts(
        inner: Arc<dyn StorageBackend>,
        prefix: impl AsRef<str>,
        strategy: PrefixStrategy,
    ) -> Self {
        Self {
            inner,
            prefix: normalize_key(prefix.as_ref()),
            strategy,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn strategy(&self) -> PrefixStrategy {
        self.strategy
    }

    pub fn inner(&self) -> &Arc<dyn StorageBackend> {
        &self.inner
    }

    /// Key as sent to the wrapped backend.
    pub fn prepare_key(&self, key: &str) -> String {
        let key = normalize_key(key);
        match self.strategy {
            PrefixStrategy::Manual => join_key(&self.prefix, &key),
            PrefixStrategy::Native => key,
        }
    }

    /// Tenant-relative key for a key reported by the wrapped backend.
    ///
    /// Returns `None` for a key outside the prefix. A key equal to the prefix
    /// becomes the empty key.
    pub fn strip_prefix(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        match self.strategy {
            PrefixStrategy::Native => Some(key),
            PrefixStrategy::Manual if self.prefix.is_empty() => Some(key),
            PrefixStrategy::Manual => {
                if key == self.prefix {
                    return Some(String::new());
                }
                key.strip_prefix(&self.prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .map(str::to_string)
            }
        }
    }

    fn scope_object(&self, mut object: StorageObject, fallback: &str) -> StorageObject {
        object.key = self
            .strip_prefix(&object.key)
            .unwrap_or_else(|| normalize_key(fallback));
        object
    }
}

#[async_trait]
impl StorageBackend for TenantScopedAdapter {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    #[instrument(skip(self), fields(prefix = %self.prefix))]
    async fn list_all_files(&self) -> BridgeResult<Vec<StorageObject>> {
        let listed = self.inner.list_all_files().await?;
        let total = listed.len();

        let objects: Vec<StorageObject> = listed
            .into_iter()
            .filter_map(|mut object| {
                let key = self.strip_prefix(&object.key)?;
                if key.is_empty() {
                    return None;
                }
                object.key = key;
                Some(object)
            })
            .collect();

        if objects.len() != total {
            debug!(
                "Discarded {} listed keys outside '{}'",
                total - objects.len(),
                self.prefix
            );
        }
        Ok(objects)
    }

    async fn get_file(&self, key: &str) -> BridgeResult<Option<Bytes>> {
        self.inner.get_file(&self.prepare_key(key)).await
    }

    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> BridgeResult<StorageObject> {
        let uploaded = self
            .inner
            .upload_file(&self.prepare_key(key), data, options)
            .await?;
        Ok(self.scope_object(uploaded, key))
    }

    async fn move_file(&self, from: &str, to: &str) -> BridgeResult<StorageObject> {
        let moved = self
            .inner
            .move_file(&self.prepare_key(from), &self.prepare_key(to))
            .await?;
        Ok(self.scope_object(moved, to))
    }

    async fn delete_file(&self, key: &str) -> BridgeResult<()> {
        self.inner.delete_file(&self.prepare_key(key)).await
    }

    fn generate_public_url(&self, key: &str) -> String {
        self.inner.generate_public_url(&self.prepare_key(key))
    }

    fn detect_live_photos(
        &self,
        objects: &[StorageObject],
        is_still: &dyn Fn(&str) -> bool,
    ) -> HashMap<String, StorageObject> {
        self.inner.detect_live_photos(objects, is_still)
    }

    fn download_concurrency(&self) -> Option<usize> {
        self.inner.download_concurrency()
    }

    fn listing_limit(&self) -> Option<usize> {
        self.inner.listing_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Bucket-like backend addressed by full keys.
    #[derive(Default)]
    struct MemoryBackend {
        objects: Mutex<BTreeMap<String, Bytes>>,
    }

    impl MemoryBackend {
        fn with_keys(keys: &[&str]) -> Self {
            let backend = Self::default();
            {
                let mut objects = backend.objects.lock().unwrap();
                for key in keys {
                    objects.insert(key.to_string(), Bytes::from_static(b"x"));
                }
            }
            backend
        }

        fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl StorageBackend for MemoryBackend {
        fn provider(&self) -> &str {
            "memory"
        }

        async fn list_all_files(&self) -> BridgeResult<Vec<StorageObject>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .map(|(k, v)| StorageObject::new(k.clone(), v.len() as u64))
                .collect())
        }

        async fn get_file(&self, key: &str) -> BridgeResult<Option<Bytes>> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }

        async fn upload_file(
            &self,
            key: &str,
            data: Bytes,
            _options: UploadOptions,
        ) -> BridgeResult<StorageObject> {
            let size = data.len() as u64;
            self.objects.lock().unwrap().insert(key.to_string(), data);
            Ok(StorageObject::new(key, size))
        }

        async fn move_file(&self, from: &str, to: &str) -> BridgeResult<StorageObject> {
            let mut objects = self.objects.lock().unwrap();
            let data = objects.remove(from).unwrap_or_default();
            let size = data.len() as u64;
            objects.insert(to.to_string(), data);
            Ok(StorageObject::new(to, size))
        }

        async fn delete_file(&self, key: &str) -> BridgeResult<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        fn generate_public_url(&self, key: &str) -> String {
            format!("https://cdn.example.com/{}", key)
        }

        fn download_concurrency(&self) -> Option<usize> {
            Some(3)
        }
    }

    const HOSTILE_KEYS: &[&str] = &[
        "a.jpg",
        "/a.jpg",
        "//2024//a.jpg",
        r"2024\summer\a.jpg",
        "2024/./a.jpg/",
        "../a.jpg",
        "../../t2/a.jpg",
        "2024/../../../t2/a.jpg",
        r"\\t1\..\a.jpg",
    ];

    fn manual(inner: Arc<MemoryBackend>) -> TenantScopedAdapter {
        TenantScopedAdapter::from_parts(inner, "photos/t1", PrefixStrategy::Manual)
    }

    #[test]
    fn test_round_trip_equals_normalized_key_manual() {
        let adapter = manual(Arc::new(MemoryBackend::default()));
        for key in HOSTILE_KEYS {
            let prepared = adapter.prepare_key(key);
            assert!(prepared.starts_with("photos/t1/"), "{:?} -> {}", key, prepared);
            assert_eq!(
                adapter.strip_prefix(&prepared),
                Some(normalize_key(key)),
                "key {:?}",
                key
            );
        }
    }

    #[test]
    fn test_round_trip_equals_normalized_key_native() {
        let adapter = TenantScopedAdapter::from_parts(
            Arc::new(MemoryBackend::default()),
            "t1",
            PrefixStrategy::Native,
        );
        for key in HOSTILE_KEYS {
            let prepared = adapter.prepare_key(key);
            assert_eq!(prepared, normalize_key(key));
            assert_eq!(adapter.strip_prefix(&prepared), Some(normalize_key(key)));
        }
    }

    #[test]
    fn test_key_equal_to_prefix_strips_to_empty() {
        let adapter = manual(Arc::new(MemoryBackend::default()));
        assert_eq!(adapter.strip_prefix("photos/t1"), Some(String::new()));
        assert_eq!(adapter.strip_prefix("/photos/t1/"), Some(String::new()));
        assert_eq!(adapter.strip_prefix("photos/t10/a.jpg"), None);
        assert_eq!(adapter.prepare_key(""), "photos/t1");
    }

    #[core_async::test]
    async fn test_listing_never_contains_tenant_segment() {
        let inner = Arc::new(MemoryBackend::default());
        let adapter = manual(inner.clone());

        for key in HOSTILE_KEYS {
            adapter
                .upload_file(key, Bytes::from_static(b"img"), UploadOptions::default())
                .await
                .unwrap();
        }

        assert!(inner.keys().iter().all(|k| k.starts_with("photos/t1/")));

        let listed = adapter.list_all_files().await.unwrap();
        assert!(!listed.is_empty());
        for object in &listed {
            assert!(!object.key.starts_with('/'));
            assert!(!object.key.starts_with("photos/"), "{}", object.key);
            assert!(
                !object.key.split('/').any(|s| s == ".." || s == "t1"),
                "{}",
                object.key
            );
        }
    }

    #[core_async::test]
    async fn test_foreign_keys_are_discarded() {
        let inner = Arc::new(MemoryBackend::with_keys(&[
            "photos/t1/a.jpg",
            "photos/t1/2024/b.jpg",
            "photos/t10/c.jpg",
            "photos/t2/d.jpg",
            "other.jpg",
        ]));
        let adapter = manual(inner);

        let keys: Vec<String> = adapter
            .list_all_files()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["2024/b.jpg", "a.jpg"]);
    }

    #[core_async::test]
    async fn test_operations_are_rewritten() {
        let inner = Arc::new(MemoryBackend::with_keys(&["photos/t1/a.jpg"]));
        let adapter = manual(inner.clone());

        assert!(adapter.get_file("a.jpg").await.unwrap().is_some());
        assert!(adapter.get_file("photos/t1/a.jpg").await.unwrap().is_none());

        let moved = adapter.move_file("a.jpg", "2024/a.jpg").await.unwrap();
        assert_eq!(moved.key, "2024/a.jpg");
        assert_eq!(inner.keys(), vec!["photos/t1/2024/a.jpg"]);

        assert_eq!(
            adapter.generate_public_url("2024/a.jpg"),
            "https://cdn.example.com/photos/t1/2024/a.jpg"
        );

        adapter.delete_file("/2024//a.jpg").await.unwrap();
        assert!(inner.keys().is_empty());
        assert_eq!(adapter.download_concurrency(), Some(3));
        assert_eq!(adapter.provider(), "memory");
    }

    #[core_async::test]
    async fn test_connect_native_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("base/t1/2024")).unwrap();
        std::fs::create_dir_all(dir.path().join("base/t2")).unwrap();
        std::fs::write(dir.path().join("base/t1/2024/a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("base/t2/b.jpg"), b"b").unwrap();

        let config = ManagedStorageConfig::new(
            "t1",
            core_runtime::config::StorageConfig::Local(core_runtime::config::LocalConfig::new(
                dir.path(),
            )),
        )
        .with_base_prefix("/base/");

        let adapter = TenantScopedAdapter::connect(&config, None).await.unwrap();
        assert_eq!(adapter.strategy(), PrefixStrategy::Native);
        assert_eq!(adapter.prefix(), "base/t1");

        let keys: Vec<String> = adapter
            .list_all_files()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["2024/a.jpg"]);
    }

    #[core_async::test]
    async fn test_connect_rejects_empty_and_dot_tenants() {
        let dir = tempfile::tempdir().unwrap();
        for tenant in ["  ", ".", "..", "./", "t1/.."] {
            let config = ManagedStorageConfig::new(
                tenant,
                core_runtime::config::StorageConfig::Local(core_runtime::config::LocalConfig::new(
                    dir.path(),
                )),
            );
            assert!(
                matches!(
                    TenantScopedAdapter::connect(&config, None).await,
                    Err(crate::StorageError::Config(core_runtime::Error::Config(_)))
                ),
                "tenant {:?} connected",
                tenant
            );
        }
    }
}
