//! Local filesystem `StorageBackend` implementation

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::storage::{StorageBackend, StorageObject, UploadOptions};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_async::fs;
use core_runtime::config::LocalConfig;
use core_runtime::logging::TaggedLogger;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::LocalStorageError;

/// A directory tree as a [`StorageBackend`].
///
/// `base_path` is the key root, so tenant scoping is applied by pointing it
/// at the tenant's directory.
pub struct LocalStorageBackend {
    base_path: PathBuf,
    base_url: Option<String>,
    logger: TaggedLogger,
}

impl LocalStorageBackend {
    pub fn new(config: LocalConfig, logger: TaggedLogger) -> Self {
        Self {
            base_path: config.base_path,
            base_url: config.base_url,
            logger,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Filesystem path of `key`; keys may not step outside the base.
    fn resolve(&self, key: &str) -> std::result::Result<PathBuf, LocalStorageError> {
        let mut path = self.base_path.clone();
        let mut segments = 0;
        for segment in key.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                return Err(LocalStorageError::InvalidKey(key.to_string()));
            }
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(LocalStorageError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }

    async fn describe(&self, key: &str, path: &Path) -> std::result::Result<StorageObject, LocalStorageError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| LocalStorageError::io(path, e))?;
        Ok(object_from_metadata(key, &metadata))
    }

    async fn ensure_parent(path: &Path) -> std::result::Result<(), LocalStorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LocalStorageError::io(parent, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    fn provider(&self) -> &str {
        "local"
    }

    #[instrument(skip(self), fields(base = %self.base_path.display()))]
    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let mut objects = Vec::new();

        match fs::metadata(&self.base_path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(LocalStorageError::InvalidKey(format!(
                    "{} is not a directory",
                    self.base_path.display()
                ))
                .into())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Base directory does not exist yet, listing is empty");
                return Ok(objects);
            }
            Err(e) => return Err(LocalStorageError::io(&self.base_path, e).into()),
        }

        let mut pending = vec![(self.base_path.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| LocalStorageError::io(&dir, e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| LocalStorageError::io(&dir, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if prefix.is_empty() {
                    name
                } else {
                    format!("{}/{}", prefix, name)
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| LocalStorageError::io(entry.path(), e))?;

                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if file_type.is_file() {
                    let metadata = entry
                        .metadata()
                        .await
                        .map_err(|e| LocalStorageError::io(entry.path(), e))?;
                    objects.push(object_from_metadata(&key, &metadata));
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        self.logger.info(format_args!(
            "Listed {} files under {}",
            objects.len(),
            self.base_path.display()
        ));
        Ok(objects)
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LocalStorageError::io(path, e).into()),
        }
    }

    #[instrument(skip(self, data, _options), fields(size = data.len()))]
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        _options: UploadOptions,
    ) -> Result<StorageObject> {
        let path = self.resolve(key)?;
        Self::ensure_parent(&path).await?;
        fs::write(&path, &data)
            .await
            .map_err(|e| LocalStorageError::io(&path, e))?;
        Ok(self.describe(key, &path).await?)
    }

    #[instrument(skip(self))]
    async fn move_file(&self, from: &str, to: &str) -> Result<StorageObject> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        Self::ensure_parent(&target).await?;
        fs::rename(&source, &target)
            .await
            .map_err(|e| LocalStorageError::io(&source, e))?;
        Ok(self.describe(to, &target).await?)
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LocalStorageError::io(path, e).into()),
        }
    }

    fn generate_public_url(&self, key: &str) -> String {
        let encoded = key
            .trim_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), encoded),
            None => format!(
                "file://{}/{}",
                self.base_path.display().to_string().trim_end_matches('/'),
                encoded
            ),
        }
    }
}

/// Modification time in millis and size, both hex; changes whenever either does.
fn object_from_metadata(key: &str, metadata: &std::fs::Metadata) -> StorageObject {
    let modified: Option<DateTime<Utc>> = metadata.modified().ok().map(DateTime::<Utc>::from);
    let millis = modified.map(|t| t.timestamp_millis()).unwrap_or_default();

    let mut object = StorageObject::new(key, metadata.len())
        .with_etag(format!("{:x}-{:x}", millis, metadata.len()));
    object.last_modified = modified;
    object
}
