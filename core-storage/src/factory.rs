//! Backend construction from [`StorageConfig`]

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use bridge_traits::storage::StorageBackend;
use core_runtime::config::StorageConfig;
use core_runtime::logging::TaggedLogger;
use provider_github::GithubStorageBackend;
use provider_local::LocalStorageBackend;
use provider_s3::S3StorageBackend;
use tracing::{debug, instrument};

use crate::error::Result;

/// Build the concrete backend for `config`.
///
/// The config is validated first. GitHub storage needs an HTTP client; S3,
/// OSS and COS bring their own SDK transport and local storage needs none.
///
/// # Errors
///
/// [`core_runtime::Error::Config`] for an invalid config,
/// [`core_runtime::Error::CapabilityMissing`] when GitHub storage is requested
/// without `http_client`.
#[instrument(skip(config, http_client), fields(provider = config.provider_name()))]
pub async fn create_backend(
    config: &StorageConfig,
    http_client: Option<Arc<dyn HttpClient>>,
) -> Result<Arc<dyn StorageBackend>> {
    config.validate()?;

    let backend: Arc<dyn StorageBackend> = match config {
        StorageConfig::S3(c) => Arc::new(s3_family("s3", c.clone()).await?),
        StorageConfig::Oss(c) => Arc::new(s3_family("oss", c.clone()).await?),
        StorageConfig::Cos(c) => Arc::new(s3_family("cos", c.clone()).await?),
        StorageConfig::Github(c) => {
            let http_client = http_client.ok_or_else(|| core_runtime::Error::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "GitHub storage requires an HTTP client".to_string(),
            })?;
            Arc::new(GithubStorageBackend::new(
                http_client,
                c.clone(),
                TaggedLogger::component("Github"),
            ))
        }
        StorageConfig::Local(c) => Arc::new(LocalStorageBackend::new(
            c.clone(),
            TaggedLogger::component("Local"),
        )),
    };

    debug!("Created {} storage backend", backend.provider());
    Ok(backend)
}

async fn s3_family(
    provider: &'static str,
    config: core_runtime::config::S3CompatibleConfig,
) -> Result<S3StorageBackend> {
    Ok(S3StorageBackend::connect(provider, config, TaggedLogger::component("S3")).await?)
}
