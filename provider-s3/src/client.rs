//! SDK client construction
//!
//! Maps [`S3CompatibleConfig`] onto the `aws-sdk-s3` client configuration.
//! Explicit credentials are used as given; without them the default AWS
//! provider chain (environment, profile, instance metadata) is loaded.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::Client;
use core_runtime::config::{RetryMode, S3CompatibleConfig};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, S3Error};

pub const DEFAULT_REGION: &str = "us-east-1";

const CREDENTIALS_PROVIDER_NAME: &str = "photo-sync";

/// Retry configuration; `legacy` is treated as `standard`.
pub fn retry_config(config: &S3CompatibleConfig) -> RetryConfig {
    let retry = match config.retry_mode.unwrap_or_default() {
        RetryMode::Adaptive => RetryConfig::adaptive(),
        RetryMode::Standard | RetryMode::Legacy => RetryConfig::standard(),
    };
    match config.max_attempts {
        Some(attempts) => retry.with_max_attempts(attempts),
        None => retry,
    }
}

/// Timeouts: connection → connect, socket → read, request → per attempt,
/// total → whole operation including retries.
pub fn timeout_config(config: &S3CompatibleConfig) -> TimeoutConfig {
    let mut builder = TimeoutConfig::builder();
    if let Some(ms) = config.connection_timeout_ms {
        builder = builder.connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.socket_timeout_ms {
        builder = builder.read_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.request_timeout_ms {
        builder = builder.operation_attempt_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.total_timeout_ms {
        builder = builder.operation_timeout(Duration::from_millis(ms));
    }
    builder.build()
}

/// Path-style addressing is the default for custom endpoints (MinIO, OSS and
/// COS gateways); virtual-hosted style otherwise.
pub fn uses_path_style(config: &S3CompatibleConfig) -> bool {
    config
        .force_path_style
        .unwrap_or_else(|| config.endpoint.is_some())
}

/// Build an S3 client for `config`.
///
/// # Errors
///
/// Returns [`S3Error::Config`] if the configuration is invalid.
pub async fn build_client(config: &S3CompatibleConfig) -> Result<Client> {
    config
        .validate()
        .map_err(|e| S3Error::Config(e.to_string()))?;

    let mut builder = match (&config.access_key_id, &config.secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                config.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER_NAME,
            );
            Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(credentials)
        }
        _ => {
            debug!("No explicit S3 credentials, loading the default provider chain");
            let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
            Builder::from(&shared)
        }
    };

    let region = config.region.as_deref().unwrap_or(DEFAULT_REGION);
    builder = builder
        .region(Region::new(region.to_string()))
        .force_path_style(uses_path_style(config))
        .retry_config(retry_config(config))
        .timeout_config(timeout_config(config));

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }

    Ok(Client::from_conf(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_modes() {
        let mut config = S3CompatibleConfig::new("photos");
        assert_eq!(retry_config(&config).max_attempts(), RetryConfig::standard().max_attempts());

        config.retry_mode = Some(RetryMode::Legacy);
        config.max_attempts = Some(7);
        let retry = retry_config(&config);
        assert_eq!(retry.max_attempts(), 7);
        assert_eq!(retry.mode(), RetryConfig::standard().mode());

        config.retry_mode = Some(RetryMode::Adaptive);
        assert_eq!(retry_config(&config).mode(), RetryConfig::adaptive().mode());
    }

    #[test]
    fn test_timeout_config_mapping() {
        let mut config = S3CompatibleConfig::new("photos");
        config.connection_timeout_ms = Some(1_000);
        config.socket_timeout_ms = Some(2_000);
        config.request_timeout_ms = Some(3_000);
        config.total_timeout_ms = Some(10_000);

        let timeouts = timeout_config(&config);
        assert_eq!(timeouts.connect_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(timeouts.read_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(
            timeouts.operation_attempt_timeout(),
            Some(Duration::from_secs(3))
        );
        assert_eq!(timeouts.operation_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_path_style_defaults_to_custom_endpoint() {
        let aws = S3CompatibleConfig::new("photos");
        assert!(!uses_path_style(&aws));

        let minio = S3CompatibleConfig::new("photos").with_endpoint("http://localhost:9000");
        assert!(uses_path_style(&minio));

        let mut forced = minio.clone();
        forced.force_path_style = Some(false);
        assert!(!uses_path_style(&forced));
    }

    #[core_async::test]
    async fn test_build_client_rejects_invalid_config() {
        let config = S3CompatibleConfig::new("");
        assert!(matches!(
            build_client(&config).await,
            Err(S3Error::Config(_))
        ));
    }

    #[core_async::test]
    async fn test_build_client_with_static_credentials() {
        let config = S3CompatibleConfig::new("photos")
            .with_endpoint("http://localhost:9000")
            .with_credentials("AKIA", "secret");
        assert!(build_client(&config).await.is_ok());
    }
}
