//! GitHub repository `StorageBackend` implementation

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{StorageBackend, StorageObject, UploadOptions};
use bytes::Bytes;
use core_runtime::config::GithubConfig;
use core_runtime::logging::TaggedLogger;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::GithubError;
use crate::types::{
    ContentFile, ContentWriteResponse, DeleteContentRequest, PutContentRequest, TreeResponse,
};

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const API_VERSION: &str = "2022-11-28";
const API_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// A repository directory as a [`StorageBackend`].
///
/// Keys are relative to the configured `path`, which is how tenant scoping is
/// applied to this backend.
///
/// # Example
///
/// ```ignore
/// let config = GithubConfig::new("acme", "photos").with_path("tenants/t1");
/// let backend = GithubStorageBackend::new(http_client, config, TaggedLogger::component("Github"));
/// let images = backend.list_images().await?;
/// ```
pub struct GithubStorageBackend {
    http_client: Arc<dyn HttpClient>,
    config: GithubConfig,
    /// `path` without leading or trailing slashes; empty for the repo root
    root: String,
    logger: TaggedLogger,
}

impl GithubStorageBackend {
    pub fn new(http_client: Arc<dyn HttpClient>, config: GithubConfig, logger: TaggedLogger) -> Self {
        let root = config
            .path
            .as_deref()
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();
        Self {
            http_client,
            config,
            root,
            logger,
        }
    }

    /// Repository path of a backend key.
    fn full_path(&self, key: &str) -> String {
        let key = key.trim_matches('/');
        if self.root.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.root, key)
        }
    }

    /// Backend key of a repository path, if it lives under the root.
    fn relative_key<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            return Some(path);
        }
        path.strip_prefix(self.root.as_str())?.strip_prefix('/')
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", API_BASE, self.config.owner, self.config.repo)
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/contents/{}", self.repo_url(), encode_path(path))
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_BASE,
            self.config.owner,
            self.config.repo,
            encode_path(&self.config.branch),
            encode_path(path)
        )
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        let request = HttpRequest::new(method, url)
            .header("X-GitHub-Api-Version", API_VERSION)
            .timeout(API_TIMEOUT);
        match &self.config.token {
            Some(token) => request.bearer_token(token),
            None => request,
        }
    }

    fn api_request(&self, method: HttpMethod, url: String) -> HttpRequest {
        self.request(method, url).accept("application/vnd.github+json")
    }

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, GithubError> {
        let response = self.http_client.execute(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(api_error(&response))
        }
    }

    /// Blob sha of an existing file, `None` if it does not exist.
    async fn existing_sha(&self, path: &str) -> std::result::Result<Option<String>, GithubError> {
        let url = format!(
            "{}?ref={}",
            self.contents_url(path),
            urlencoding::encode(&self.config.branch)
        );
        let response = self
            .http_client
            .execute(self.api_request(HttpMethod::Get, url))
            .await?;

        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(api_error(&response));
        }
        let file: ContentFile = parse(&response)?;
        Ok(Some(file.sha))
    }
}

#[async_trait]
impl StorageBackend for GithubStorageBackend {
    fn provider(&self) -> &str {
        "github"
    }

    #[instrument(skip(self), fields(repo = %self.config.repo, branch = %self.config.branch))]
    async fn list_all_files(&self) -> Result<Vec<StorageObject>> {
        let url = format!(
            "{}/git/trees/{}?recursive=1",
            self.repo_url(),
            urlencoding::encode(&self.config.branch)
        );
        let response = self.send(self.api_request(HttpMethod::Get, url)).await?;
        let tree: TreeResponse = parse(&response)?;

        if tree.truncated {
            return Err(GithubError::TruncatedTree(self.config.branch.clone()).into());
        }

        let objects: Vec<StorageObject> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.is_blob())
            .filter_map(|entry| {
                let key = self.relative_key(&entry.path)?;
                Some(StorageObject::new(key, entry.size.unwrap_or(0)).with_etag(entry.sha.as_str()))
            })
            .collect();

        self.logger.info(format_args!(
            "Listed {} files from {}/{}@{}",
            objects.len(),
            self.config.owner,
            self.config.repo,
            self.config.branch
        ));
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let url = self.raw_url(&self.full_path(key));
        let request = self.request(HttpMethod::Get, url).timeout(DOWNLOAD_TIMEOUT);
        let response = self.http_client.execute(request).await?;

        if response.is_not_found() {
            debug!("File not found: {}", key);
            return Ok(None);
        }
        if !response.is_success() {
            return Err(api_error(&response).into());
        }
        Ok(Some(response.body))
    }

    #[instrument(skip(self, data, options), fields(size = data.len()))]
    async fn upload_file(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<StorageObject> {
        let path = self.full_path(key);
        let sha = self.existing_sha(&path).await?;
        let message = options
            .message
            .unwrap_or_else(|| format!("Upload {}", path));
        let size = data.len() as u64;

        let body = PutContentRequest {
            message: &message,
            content: BASE64.encode(&data),
            branch: &self.config.branch,
            sha,
        };
        let request = self
            .api_request(HttpMethod::Put, self.contents_url(&path))
            .json(&body)?;
        let response = self.send(request).await?;
        let written: ContentWriteResponse = parse(&response)?;

        let mut object = StorageObject::new(key, size);
        object.etag = written.content.map(|c| c.sha);
        Ok(object)
    }

    #[instrument(skip(self))]
    async fn move_file(&self, from: &str, to: &str) -> Result<StorageObject> {
        let data = self
            .get_file(from)
            .await?
            .ok_or_else(|| BridgeError::NotFound(from.to_string()))?;
        let moved = self
            .upload_file(
                to,
                data,
                UploadOptions {
                    content_type: None,
                    message: Some(format!("Move {} to {}", from, to)),
                },
            )
            .await?;
        self.delete_file(from).await?;
        Ok(moved)
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.full_path(key);
        let Some(sha) = self.existing_sha(&path).await? else {
            debug!("Nothing to delete at {}", path);
            return Ok(());
        };

        let message = format!("Delete {}", path);
        let body = DeleteContentRequest {
            message: &message,
            sha,
            branch: &self.config.branch,
        };
        let request = self
            .api_request(HttpMethod::Delete, self.contents_url(&path))
            .json(&body)?;
        self.send(request).await?;
        Ok(())
    }

    fn generate_public_url(&self, key: &str) -> String {
        let path = encode_path(&self.full_path(key));
        let branch = encode_path(&self.config.branch);
        if self.config.use_raw_url {
            format!(
                "{}/{}/{}/{}/{}",
                RAW_BASE, self.config.owner, self.config.repo, branch, path
            )
        } else {
            format!(
                "https://github.com/{}/{}/blob/{}/{}?raw=true",
                self.config.owner, self.config.repo, branch, path
            )
        }
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse<T: serde::de::DeserializeOwned>(
    response: &HttpResponse,
) -> std::result::Result<T, GithubError> {
    serde_json::from_slice(&response.body).map_err(|e| GithubError::ParseError(e.to_string()))
}

fn api_error(response: &HttpResponse) -> GithubError {
    GithubError::ApiError {
        status_code: response.status,
        message: String::from_utf8_lossy(&response.body).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::function;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn backend(mock_http: MockHttpClient, config: GithubConfig) -> GithubStorageBackend {
        GithubStorageBackend::new(
            Arc::new(mock_http),
            config,
            TaggedLogger::component("Github"),
        )
    }

    fn config() -> GithubConfig {
        GithubConfig::new("acme", "gallery")
            .with_path("/photos/t1/")
            .with_token("ghp_test")
    }

    #[core_async::test]
    async fn test_list_all_files_strips_root() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|req| {
                assert!(req.url.ends_with("/repos/acme/gallery/git/trees/main?recursive=1"));
                assert_eq!(
                    req.headers.get("Authorization").map(String::as_str),
                    Some("Bearer ghp_test")
                );
                let body = r#"{
                    "sha": "root",
                    "truncated": false,
                    "tree": [
                        {"path": "photos", "type": "tree", "sha": "d1"},
                        {"path": "photos/t1/2024/a.jpg", "type": "blob", "sha": "b1", "size": 10},
                        {"path": "photos/t1/2024/a.mov", "type": "blob", "sha": "b2", "size": 20},
                        {"path": "photos/t10/b.jpg", "type": "blob", "sha": "b3", "size": 30},
                        {"path": "README.md", "type": "blob", "sha": "b4", "size": 5}
                    ]
                }"#;
                Ok(HttpResponse::new(200, body))
            });

        let files = backend(mock_http, config()).list_all_files().await.unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();

        assert_eq!(keys, vec!["2024/a.jpg", "2024/a.mov"]);
        assert_eq!(files[0].etag.as_deref(), Some("b1"));
        assert_eq!(files[1].size, 20);
    }

    #[core_async::test]
    async fn test_truncated_tree_fails_listing() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"sha": "root", "truncated": true, "tree": []}"#,
            ))
        });

        let result = backend(mock_http, config()).list_all_files().await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[core_async::test]
    async fn test_get_file_uses_raw_host() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(
                req.url,
                "https://raw.githubusercontent.com/acme/gallery/main/photos/t1/2024/a%20b.jpg"
            );
            Ok(HttpResponse::new(200, vec![1u8, 2, 3]))
        });

        let data = backend(mock_http, config())
            .get_file("2024/a b.jpg")
            .await
            .unwrap();
        assert_eq!(data.unwrap().as_ref(), &[1, 2, 3]);
    }

    #[core_async::test]
    async fn test_get_file_not_found_is_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(404, "404: Not Found")));

        let data = backend(mock_http, config()).get_file("missing.jpg").await.unwrap();
        assert!(data.is_none());
    }

    #[core_async::test]
    async fn test_upload_replaces_existing_blob() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .with(function(|req: &HttpRequest| req.method == HttpMethod::Get))
            .times(1)
            .returning(|req| {
                assert!(req.url.ends_with("/contents/photos/t1/a.jpg?ref=main"));
                Ok(HttpResponse::new(
                    200,
                    r#"{"path": "photos/t1/a.jpg", "sha": "old", "size": 3}"#,
                ))
            });
        mock_http
            .expect_execute()
            .with(function(|req: &HttpRequest| req.method == HttpMethod::Put))
            .times(1)
            .returning(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                assert_eq!(body["sha"], "old");
                assert_eq!(body["branch"], "main");
                assert_eq!(body["content"], "aGVsbG8=");
                Ok(HttpResponse::new(
                    201,
                    r#"{"content": {"path": "photos/t1/a.jpg", "sha": "new", "size": 5}}"#,
                ))
            });

        let object = backend(mock_http, config())
            .upload_file("a.jpg", Bytes::from_static(b"hello"), UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(object.key, "a.jpg");
        assert_eq!(object.size, 5);
        assert_eq!(object.etag.as_deref(), Some("new"));
    }

    #[core_async::test]
    async fn test_delete_missing_file_is_noop() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(404, "{}")));

        assert!(backend(mock_http, config()).delete_file("gone.jpg").await.is_ok());
    }

    #[core_async::test]
    async fn test_api_error_is_reported() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(403, "rate limited")));

        let result = backend(mock_http, config()).list_all_files().await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[test]
    fn test_public_urls() {
        let raw = backend(MockHttpClient::new(), config());
        assert_eq!(
            raw.generate_public_url("2024/a.jpg"),
            "https://raw.githubusercontent.com/acme/gallery/main/photos/t1/2024/a.jpg"
        );

        let mut blob_config = config();
        blob_config.use_raw_url = false;
        let blob = backend(MockHttpClient::new(), blob_config);
        assert_eq!(
            blob.generate_public_url("a.jpg"),
            "https://github.com/acme/gallery/blob/main/photos/t1/a.jpg?raw=true"
        );
    }

    #[test]
    fn test_repo_root_keys() {
        let backend = backend(MockHttpClient::new(), GithubConfig::new("acme", "gallery"));
        assert_eq!(backend.full_path("/a.jpg"), "a.jpg");
        assert_eq!(backend.relative_key("x/a.jpg"), Some("x/a.jpg"));
    }
}
