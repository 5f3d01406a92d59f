//! S3-compatible `StorageBackend` implementation

use async_trait::async_trait;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SmithyDateTime};
use aws_sdk_s3::Client;
use bridge_traits::error::Result;
use bridge_traits::storage::{StorageBackend, StorageObject, UploadOptions};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::S3CompatibleConfig;
use core_runtime::logging::TaggedLogger;
use regex::Regex;
use tracing::{debug, instrument};

use crate::client::{build_client, DEFAULT_REGION};
use crate::error::S3Error;

/// Objects per `ListObjectsV2` page (service maximum).
const LIST_PAGE_SIZE: i32 = 1000;

/// S3, OSS or COS bucket as a [`StorageBackend`].
///
/// # Example
///
/// ```ignore
/// let config = S3CompatibleConfig::new("photos").with_region("eu-west-1");
/// let backend = S3StorageBackend::connect("s3", config, TaggedLogger::component("S3")).await?;
/// let images = backend.list_images().await?;
/// ```
pub struct S3StorageBackend {
    client: Client,
    provider: &'static str,
    config: S3CompatibleConfig,
    exclude: Option<Regex>,
    logger: TaggedLogger,
}

impl S3StorageBackend {
    /// Build the SDK client and wrap it.
    ///
    /// `provider` is the name reported by [`StorageBackend::provider`]
    /// (`s3`, `oss` or `cos`).
    pub async fn connect(
        provider: &'static str,
        config: S3CompatibleConfig,
        logger: TaggedLogger,
    ) -> std::result::Result<Self, S3Error> {
        let client = build_client(&config).await?;
        Self::with_client(client, provider, config, logger)
    }

    /// Wrap an existing client.
    pub fn with_client(
        client: Client,
        provider: &'static str,
        config: S3CompatibleConfig,
        logger: TaggedLogger,
    ) -> std::result::Result<Self, S3Error> {
        let exclude = config
            .exclude_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| S3Error::Config(format!("Invalid excludeRegex: {}", e)))?;

        Ok(Self {
            client,
            provider,
            config,
            exclude,
            logger,
        })
    }

    fn is_listed(&self, key: &str) -> bool {
        is_listed(key, self.exclude.as_ref())
    }

    async fn head(&self, key: &str) -> std::result::Result<StorageObject, S3Error> {
        let head = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::Fetch {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let mut object = StorageObject::new(key, head.content_length().unwrap_or(0).max(0) as u64);
        object.etag = head.e_tag().map(str::to_string);
        object.last_modified = head.last_modified().and_then(to_chrono);
        Ok(object)
    }
}

#[async_trait]
impl StorageBackend for S3StorageBackend {
    fn provider(&self) -> &str {
        self.provider
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket, prefix = ?self.config.prefix))]
    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;
        let limit = self.config.max_file_limit;

        'pages: loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .max_keys(LIST_PAGE_SIZE);

            if let Some(prefix) = &self.config.prefix {
                request = request.prefix(listing_prefix(prefix));
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| S3Error::List {
                bucket: self.config.bucket.clone(),
                message: e.to_string(),
            })?;

            if let Some(ref contents) = response.contents {
                for obj in contents {
                    let Some(key) = obj.key.as_deref() else {
                        continue;
                    };
                    if !self.is_listed(key) {
                        continue;
                    }

                    let mut object =
                        StorageObject::new(key, obj.size.unwrap_or(0).max(0) as u64);
                    object.etag = obj.e_tag.clone();
                    object.last_modified = obj.last_modified.as_ref().and_then(to_chrono);
                    objects.push(object);

                    if limit.is_some_and(|max| objects.len() >= max) {
                        self.logger.warn(format_args!(
                            "Listing capped at maxFileLimit = {}; it may be partial",
                            objects.len()
                        ));
                        break 'pages;
                    }
                }
            }

            match next_page(
                &self.config.bucket,
                response.is_truncated(),
                response.next_continuation_token,
            )? {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        self.logger
            .info(format_args!("Listed {} objects from {}", objects.len(), self.config.bucket));
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    debug!("Object not found: {}", key);
                    return Ok(None);
                }
                return Err(S3Error::Fetch {
                    key: key.to_string(),
                    message: e.to_string(),
                }
                .into());
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| S3Error::Fetch {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        debug!("Fetched {} bytes from {}", data.len(), key);
        Ok(Some(data))
    }

    #[instrument(skip(self, data, options), fields(size = data.len()))]
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<StorageObject> {
        let size = data.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_content_type(options.content_type)
            .send()
            .await
            .map_err(|e| S3Error::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let mut object = StorageObject::new(key, size).with_last_modified(Utc::now());
        object.etag = output.e_tag().map(str::to_string);
        Ok(object)
    }

    #[instrument(skip(self))]
    async fn move_file(&self, from: &str, to: &str) -> Result<StorageObject> {
        self.client
            .copy_object()
            .bucket(&self.config.bucket)
            .copy_source(format!("{}/{}", self.config.bucket, encode_key(from)))
            .key(to)
            .send()
            .await
            .map_err(|e| S3Error::Copy {
                from: from.to_string(),
                to: to.to_string(),
                message: e.to_string(),
            })?;

        self.delete_file(from).await?;
        Ok(self.head(to).await?)
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::Delete {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn generate_public_url(&self, key: &str) -> String {
        public_url(&self.config, key)
    }

    fn download_concurrency(&self) -> Option<usize> {
        self.config.download_concurrency
    }

    fn listing_limit(&self) -> Option<usize> {
        self.config.max_file_limit
    }
}

/// Continuation token for the next `ListObjectsV2` page, `None` when the
/// listing is complete.
fn next_page(
    bucket: &str,
    is_truncated: Option<bool>,
    token: Option<String>,
) -> std::result::Result<Option<String>, S3Error> {
    match (is_truncated, token) {
        (Some(true), Some(token)) => Ok(Some(token)),
        (Some(true), None) => Err(S3Error::List {
            bucket: bucket.to_string(),
            message: "truncated page without a continuation token".to_string(),
        }),
        _ => Ok(None),
    }
}

/// Listing filter for a configured prefix: `photos` lists `photos/...` only.
fn listing_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn is_listed(key: &str, exclude: Option<&Regex>) -> bool {
    !key.ends_with('/') && !exclude.is_some_and(|re| re.is_match(key))
}

/// Percent-encode each key segment, keeping `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Public URL of `key`: custom domain, else path-style endpoint, else the
/// virtual-hosted AWS URL.
pub fn public_url(config: &S3CompatibleConfig, key: &str) -> String {
    let key = encode_key(key.trim_start_matches('/'));
    if let Some(domain) = config.custom_domain.as_deref().filter(|d| !d.is_empty()) {
        return format!("{}/{}", with_scheme(domain), key);
    }
    if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        return format!("{}/{}/{}", with_scheme(endpoint), config.bucket, key);
    }
    let region = config.region.as_deref().unwrap_or(DEFAULT_REGION);
    format!("https://{}.s3.{}.amazonaws.com/{}", config.bucket, region, key)
}

fn to_chrono(timestamp: &SmithyDateTime) -> Option<DateTime<Utc>> {
    timestamp
        .to_millis()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
