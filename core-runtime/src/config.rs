//! # Photo Sync Configuration
//!
//! Configuration surface for the sync pipeline: where photos live, how they
//! are processed, how the worker pool is shaped, and the two request payloads
//! collaborators send (run a sync, resolve conflicts).
//!
//! ## Overview
//!
//! - [`StorageConfig`] is a tagged enum (`"provider": "s3" | "oss" | "cos" |
//!   "github" | "local"`); every backend variant carries its own typed config.
//! - [`ManagedStorageConfig`] wraps an upstream `StorageConfig` with the
//!   tenant segment and an optional custom base prefix.
//! - [`ProcessingConfig`] and [`WorkerConfig`] shape the orchestrator.
//! - [`PhotoSyncConfig`] bundles all of the above and is built through
//!   [`PhotoSyncConfigBuilder`], which validates fail-fast.
//!
//! All serde types use camelCase field names so the JSON payloads produced by
//! the web layer deserialize directly.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{PhotoSyncConfig, StorageConfig, LocalConfig};
//!
//! let config = PhotoSyncConfig::builder()
//!     .tenant_id("acme")
//!     .storage(StorageConfig::Local(LocalConfig::new("/srv/photos")))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Validation failures are [`Error::Config`] with a message naming the field
//! and the accepted range. A configuration error is fatal at construction;
//! nothing downstream re-validates.

use crate::error::{Error, Result};
use crate::logging::redact_if_sensitive;
use bridge_traits::storage::IMAGE_EXTENSIONS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-unit worker timeout.
pub const DEFAULT_WORKER_TIMEOUT_MS: u64 = 30_000;

/// Longest digest suffix a photo id may carry (hex chars of SHA-256).
pub const MAX_DIGEST_SUFFIX_LENGTH: usize = 64;

/// Available CPU parallelism, or 4 when the host cannot report it.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_true() -> bool {
    true
}

fn default_branch() -> String {
    "main".to_string()
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Non-empty `/` or `\` separated segments of `value`; `.` and `..` are
/// configuration errors.
fn key_segments<'a>(value: &'a str, field: &str) -> Result<Vec<&'a str>> {
    let segments: Vec<&str> = value
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "." | "..")) {
        return Err(Error::Config(format!(
            "{} cannot contain a '{}' segment",
            field, bad
        )));
    }
    Ok(segments)
}

// ============================================================================
// Storage backends
// ============================================================================

/// Retry behaviour of the S3 SDK client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    #[default]
    Standard,
    Adaptive,
    /// Accepted for compatibility; treated as `Standard`.
    Legacy,
}

/// Configuration shared by S3, Alibaba OSS and Tencent COS.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3CompatibleConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Listing filter; keys stay full bucket keys.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Public URL host used instead of the endpoint (`https://cdn.example.com`).
    #[serde(default)]
    pub custom_domain: Option<String>,
    /// Keys matching this pattern are dropped from listings.
    #[serde(default)]
    pub exclude_regex: Option<String>,
    /// Listing stops after this many objects.
    #[serde(default)]
    pub max_file_limit: Option<usize>,
    #[serde(default)]
    pub force_path_style: Option<bool>,
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default)]
    pub socket_timeout_ms: Option<u64>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub total_timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_mode: Option<RetryMode>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub download_concurrency: Option<usize>,
}

impl S3CompatibleConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.bucket, "S3 bucket")?;
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(Error::Config(
                "S3 credentials need both accessKeyId and secretAccessKey".to_string(),
            ));
        }
        if let Some(pattern) = &self.exclude_regex {
            regex::Regex::new(pattern).map_err(|e| {
                Error::Config(format!("Invalid excludeRegex '{}': {}", pattern, e))
            })?;
        }
        if self.max_file_limit == Some(0) {
            return Err(Error::Config(
                "maxFileLimit must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::Config("maxAttempts must be at least 1".to_string()));
        }
        if self.download_concurrency == Some(0) {
            return Err(Error::Config(
                "downloadConcurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for S3CompatibleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self
                    .secret_access_key
                    .as_deref()
                    .map(|v| redact_if_sensitive("secret_access_key", v)),
            )
            .field(
                "session_token",
                &self
                    .session_token
                    .as_deref()
                    .map(|v| redact_if_sensitive("session_token", v)),
            )
            .field("prefix", &self.prefix)
            .field("custom_domain", &self.custom_domain)
            .field("exclude_regex", &self.exclude_regex)
            .field("max_file_limit", &self.max_file_limit)
            .field("retry_mode", &self.retry_mode)
            .field("max_attempts", &self.max_attempts)
            .field("download_concurrency", &self.download_concurrency)
            .finish_non_exhaustive()
    }
}

/// Photos stored in a GitHub repository.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Directory inside the repository that acts as the key root.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub use_raw_url: bool,
}

impl GithubConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: default_branch(),
            token: None,
            path: None,
            use_raw_url: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.owner, "GitHub owner")?;
        require_non_empty(&self.repo, "GitHub repo")?;
        require_non_empty(&self.branch, "GitHub branch")
    }
}

impl fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field(
                "token",
                &self.token.as_deref().map(|v| redact_if_sensitive("token", v)),
            )
            .field("path", &self.path)
            .field("use_raw_url", &self.use_raw_url)
            .finish()
    }
}

/// Photos stored in a local directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    pub base_path: PathBuf,
    /// Prefix for public URLs, e.g. `https://photos.example.com`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl LocalConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(Error::Config("Local basePath cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Backend selection, tagged by `provider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StorageConfig {
    S3(S3CompatibleConfig),
    Oss(S3CompatibleConfig),
    Cos(S3CompatibleConfig),
    Github(GithubConfig),
    Local(LocalConfig),
}

impl StorageConfig {
    pub fn provider_name(&self) -> &'static str {
        match self {
            StorageConfig::S3(_) => "s3",
            StorageConfig::Oss(_) => "oss",
            StorageConfig::Cos(_) => "cos",
            StorageConfig::Github(_) => "github",
            StorageConfig::Local(_) => "local",
        }
    }

    /// Whether the backend takes a key root in its own configuration.
    ///
    /// S3-family backends address full bucket keys, so tenant prefixes must be
    /// prepended and stripped on every call instead.
    pub fn is_natively_scoped(&self) -> bool {
        matches!(self, StorageConfig::Github(_) | StorageConfig::Local(_))
    }

    /// Key-space base path configured on the backend itself.
    pub fn key_base(&self) -> Option<&str> {
        match self {
            StorageConfig::S3(c) | StorageConfig::Oss(c) | StorageConfig::Cos(c) => {
                c.prefix.as_deref()
            }
            StorageConfig::Github(c) => c.path.as_deref(),
            StorageConfig::Local(_) => None,
        }
    }

    /// Copy of this config whose key root is `effective_prefix`.
    ///
    /// For natively scoped backends this is the only place the tenant prefix
    /// is applied. For the S3 family it narrows the listing filter.
    pub fn scoped_to(&self, effective_prefix: &str) -> StorageConfig {
        let prefix = (!effective_prefix.is_empty()).then(|| effective_prefix.to_string());
        match self {
            StorageConfig::S3(c) => StorageConfig::S3(S3CompatibleConfig {
                prefix,
                ..c.clone()
            }),
            StorageConfig::Oss(c) => StorageConfig::Oss(S3CompatibleConfig {
                prefix,
                ..c.clone()
            }),
            StorageConfig::Cos(c) => StorageConfig::Cos(S3CompatibleConfig {
                prefix,
                ..c.clone()
            }),
            StorageConfig::Github(c) => StorageConfig::Github(GithubConfig {
                path: prefix,
                ..c.clone()
            }),
            StorageConfig::Local(c) => {
                let mut base_path = c.base_path.clone();
                for segment in effective_prefix.split('/').filter(|s| !s.is_empty()) {
                    base_path.push(segment);
                }
                let base_url = c
                    .base_url
                    .as_ref()
                    .map(|url| join_url(url, effective_prefix));
                StorageConfig::Local(LocalConfig {
                    base_path,
                    base_url,
                })
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::S3(c) | StorageConfig::Oss(c) | StorageConfig::Cos(c) => c.validate(),
            StorageConfig::Github(c) => c.validate(),
            StorageConfig::Local(c) => c.validate(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return base.trim_end_matches('/').to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Tenant-scoped storage: an upstream backend plus the tenant segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStorageConfig {
    pub tenant_id: String,
    /// Extra prefix between the backend's own base and the tenant segment.
    #[serde(default)]
    pub base_prefix: Option<String>,
    pub upstream: StorageConfig,
}

impl ManagedStorageConfig {
    pub fn new(tenant_id: impl Into<String>, upstream: StorageConfig) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            base_prefix: None,
            upstream,
        }
    }

    pub fn with_base_prefix(mut self, base_prefix: impl Into<String>) -> Self {
        self.base_prefix = Some(base_prefix.into());
        self
    }

    /// `upstream base / base prefix / tenant`, single slashes, no empty
    /// segments, no leading or trailing slash.
    pub fn effective_prefix(&self) -> Result<String> {
        let tenant = match key_segments(&self.tenant_id, "Tenant id")?.as_slice() {
            [] => {
                return Err(Error::Config(
                    "Tenant id is required for managed storage".to_string(),
                ))
            }
            [tenant] => *tenant,
            _ => {
                return Err(Error::Config(format!(
                    "Tenant id '{}' must be a single path segment",
                    self.tenant_id
                )))
            }
        };

        let mut segments = key_segments(
            self.upstream.key_base().unwrap_or_default(),
            "Storage base path",
        )?;
        segments.extend(key_segments(
            self.base_prefix.as_deref().unwrap_or_default(),
            "basePrefix",
        )?);
        segments.push(tenant);
        Ok(segments.join("/"))
    }

    pub fn validate(&self) -> Result<()> {
        self.effective_prefix()?;
        self.upstream.validate()
    }
}

// ============================================================================
// Processing and workers
// ============================================================================

/// Per-object processing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingConfig {
    pub default_concurrency: usize,
    pub enable_live_photo_detection: bool,
    /// Lower-case extensions considered photos.
    pub supported_formats: Vec<String>,
    /// Hex chars of SHA-256(key) appended to photo ids; 0 disables.
    pub digest_suffix_length: usize,
    /// Use directory segments as tags when EXIF carries none.
    pub directory_tags: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_parallelism(),
            enable_live_photo_detection: true,
            supported_formats: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            digest_suffix_length: 0,
            directory_tags: false,
        }
    }
}

impl ProcessingConfig {
    pub fn is_supported(&self, extension: &str) -> bool {
        self.supported_formats
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_concurrency == 0 {
            return Err(Error::Config(
                "defaultConcurrency must be greater than 0".to_string(),
            ));
        }
        if self.supported_formats.is_empty() {
            return Err(Error::Config(
                "supportedFormats must list at least one extension".to_string(),
            ));
        }
        if self.digest_suffix_length > MAX_DIGEST_SUFFIX_LENGTH {
            return Err(Error::Config(format!(
                "digestSuffixLength must be at most {}",
                MAX_DIGEST_SUFFIX_LENGTH
            )));
        }
        Ok(())
    }
}

/// Worker pool shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    /// Per-unit timeout in milliseconds.
    pub timeout: u64,
    /// Run every unit in a child process.
    pub use_cluster_mode: bool,
    pub worker_concurrency: usize,
    pub worker_count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let parallelism = default_parallelism();
        Self {
            timeout: DEFAULT_WORKER_TIMEOUT_MS,
            use_cluster_mode: false,
            worker_concurrency: parallelism,
            worker_count: parallelism,
        }
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Units allowed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        if self.use_cluster_mode {
            self.worker_count.saturating_mul(self.worker_concurrency)
        } else {
            self.worker_concurrency
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            return Err(Error::Config(
                "Worker timeout must be greater than 0 ms".to_string(),
            ));
        }
        if self.worker_concurrency == 0 || self.worker_count == 0 {
            return Err(Error::Config(
                "workerConcurrency and workerCount must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Processing and worker options sent with a run request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderConfig {
    pub processing: ProcessingConfig,
    pub worker: WorkerConfig,
}

// ============================================================================
// Requests
// ============================================================================

/// Payload of a sync run request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSyncRequest {
    #[serde(default)]
    pub builder_config: Option<BuilderConfig>,
    #[serde(default)]
    pub storage_config: Option<StorageConfig>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Which side a merged field is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSide {
    Local,
    Remote,
}

/// How tags are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMerge {
    Local,
    Remote,
    Union,
}

/// Field-by-field choices for the `manual-merge` strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergePlan {
    pub title: FieldSide,
    pub description: FieldSide,
    pub tags: TagMerge,
    pub date_taken: FieldSide,
    pub live_photo: FieldSide,
    pub digest: FieldSide,
}

impl Default for MergePlan {
    fn default() -> Self {
        Self {
            title: FieldSide::Local,
            description: FieldSide::Local,
            tags: TagMerge::Union,
            date_taken: FieldSide::Remote,
            live_photo: FieldSide::Remote,
            digest: FieldSide::Remote,
        }
    }
}

/// Payload of a conflict resolution request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// `prefer-remote`, `prefer-local` or `manual-merge`.
    #[serde(default)]
    pub strategy: Option<String>,
    /// Restrict resolution to these keys; all conflicts when absent.
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub merge: Option<MergePlan>,
    #[serde(default)]
    pub builder_config: Option<BuilderConfig>,
    #[serde(default)]
    pub storage_config: Option<StorageConfig>,
    #[serde(default)]
    pub dry_run: bool,
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// Everything one tenant's sync needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoSyncConfig {
    pub storage: ManagedStorageConfig,
    pub processing: ProcessingConfig,
    pub worker: WorkerConfig,
}

impl PhotoSyncConfig {
    pub fn builder() -> PhotoSyncConfigBuilder {
        PhotoSyncConfigBuilder::default()
    }

    pub fn tenant_id(&self) -> &str {
        &self.storage.tenant_id
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        self.processing.validate()?;
        self.worker.validate()
    }

    /// Apply the optional overrides carried by a request and re-validate.
    pub fn with_overrides(
        &self,
        builder_config: Option<&BuilderConfig>,
        storage_config: Option<&StorageConfig>,
    ) -> Result<Self> {
        let mut config = self.clone();
        if let Some(builder) = builder_config {
            config.processing = builder.processing.clone();
            config.worker = builder.worker.clone();
        }
        if let Some(storage) = storage_config {
            config.storage.upstream = storage.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`PhotoSyncConfig`].
#[derive(Debug, Default)]
pub struct PhotoSyncConfigBuilder {
    tenant_id: Option<String>,
    base_prefix: Option<String>,
    storage: Option<StorageConfig>,
    processing: Option<ProcessingConfig>,
    worker: Option<WorkerConfig>,
}

impl PhotoSyncConfigBuilder {
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn base_prefix(mut self, base_prefix: impl Into<String>) -> Self {
        self.base_prefix = Some(base_prefix.into());
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = Some(processing);
        self
    }

    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the tenant or storage is missing, or any
    /// section fails validation.
    pub fn build(self) -> Result<PhotoSyncConfig> {
        let tenant_id = self
            .tenant_id
            .ok_or_else(|| Error::Config("Tenant id is required".to_string()))?;
        let upstream = self.storage.ok_or_else(|| {
            Error::Config("Storage configuration is required (s3, oss, cos, github or local)".to_string())
        })?;

        let config = PhotoSyncConfig {
            storage: ManagedStorageConfig {
                tenant_id,
                base_prefix: self.base_prefix,
                upstream,
            },
            processing: self.processing.unwrap_or_default(),
            worker: self.worker.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}
