//! GitHub REST API payloads
//!
//! See <https://docs.github.com/en/rest/git/trees> and
//! <https://docs.github.com/en/rest/repos/contents>.

use serde::{Deserialize, Serialize};

/// `GET /repos/{owner}/{repo}/git/trees/{ref}?recursive=1`
#[derive(Debug, Clone, Deserialize)]
pub struct TreeResponse {
    pub sha: String,
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// `blob`, `tree` or `commit` (submodule)
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    /// Present for blobs only
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// File metadata returned by the contents API.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentFile {
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
}

/// Response of a contents `PUT`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentWriteResponse {
    pub content: Option<ContentFile>,
}

/// Body of a contents `PUT`.
#[derive(Debug, Clone, Serialize)]
pub struct PutContentRequest<'a> {
    pub message: &'a str,
    /// Base64-encoded file content
    pub content: String,
    pub branch: &'a str,
    /// Blob sha of the file being replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Body of a contents `DELETE`.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteContentRequest<'a> {
    pub message: &'a str,
    pub sha: String,
    pub branch: &'a str,
}
