use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_LENGTH;
use reqwest::Method;
use serde::Deserialize;

use crate::error::Result;
use crate::github::client::RateLimitedClient;
use crate::models::RepositoryReference;

/// GitHub commit payload, shared by the list and single-commit endpoints.
/// `files` is only populated by the single-commit endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub commit: CommitBody,
    pub author: Option<GitHubUser>,
    #[serde(default)]
    pub files: Vec<ChangedFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitBody {
    pub message: String,
    pub author: Option<GitAuthor>,
    pub tree: TreeRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitAuthor {
    pub name: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeRef {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// Source-host operations the pipeline depends on.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Size in bytes of the branch archive, when the host reports one.
    async fn probe_archive(&self, reference: &RepositoryReference) -> Result<Option<u64>>;

    async fn download_archive(
        &self,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Result<Bytes>;

    /// Resolve a branch name or SHA to its commit.
    async fn get_commit(
        &self,
        reference: &RepositoryReference,
        git_ref: &str,
        credential: Option<&str>,
    ) -> Result<CommitInfo>;

    /// Recursive tree listing for a tree SHA.
    async fn get_tree(
        &self,
        reference: &RepositoryReference,
        tree_sha: &str,
        credential: Option<&str>,
    ) -> Result<Vec<TreeEntry>>;

    async fn list_commits(
        &self,
        reference: &RepositoryReference,
        per_page: u32,
        credential: Option<&str>,
    ) -> Result<Vec<CommitInfo>>;

    /// Unified diff text for one commit.
    async fn get_commit_diff(
        &self,
        reference: &RepositoryReference,
        sha: &str,
        credential: Option<&str>,
    ) -> Result<String> {
        let commit = self.get_commit(reference, sha, credential).await?;
        Ok(render_diff(&commit.files))
    }
}

/// `diff --git a/{f} b/{f}` blocks joined by blank lines. Files without a
/// patch (binary, too large) are omitted.
pub fn render_diff(files: &[ChangedFile]) -> String {
    files
        .iter()
        .filter_map(|f| {
            f.patch
                .as_ref()
                .map(|patch| format!("diff --git a/{0} b/{0}\n{patch}", f.filename))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// [`SourceHost`] over the GitHub REST API and github.com archives.
pub struct GitHubApi {
    client: Arc<RateLimitedClient>,
    api_base: String,
    archive_base: String,
}

impl GitHubApi {
    pub fn new(client: Arc<RateLimitedClient>, api_base: &str, archive_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            archive_base: archive_base.trim_end_matches('/').to_string(),
        }
    }

    fn repo_url(&self, reference: &RepositoryReference, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{path}",
            self.api_base, reference.owner, reference.repo
        )
    }

    fn public_archive_url(&self, reference: &RepositoryReference) -> String {
        format!(
            "{}/{}/{}/archive/{}.zip",
            self.archive_base, reference.owner, reference.repo, reference.branch
        )
    }
}

#[async_trait]
impl SourceHost for GitHubApi {
    async fn probe_archive(&self, reference: &RepositoryReference) -> Result<Option<u64>> {
        let url = self.public_archive_url(reference);
        let resp = self.client.call(Method::HEAD, &url, None).await?;
        Ok(resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .filter(|len| *len > 0))
    }

    async fn download_archive(
        &self,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Result<Bytes> {
        let url = match credential {
            Some(_) => self.repo_url(reference, &format!("zipball/{}", reference.branch)),
            None => self.public_archive_url(reference),
        };
        let resp = self.client.call(Method::GET, &url, credential).await?;
        let bytes = resp.bytes().await?;
        tracing::info!(
            "Downloaded {} archive ({:.2} MB)",
            reference,
            bytes.len() as f64 / (1024.0 * 1024.0)
        );
        Ok(bytes)
    }

    async fn get_commit(
        &self,
        reference: &RepositoryReference,
        git_ref: &str,
        credential: Option<&str>,
    ) -> Result<CommitInfo> {
        let url = self.repo_url(reference, &format!("commits/{git_ref}"));
        let resp = self.client.call(Method::GET, &url, credential).await?;
        Ok(resp.json().await?)
    }

    async fn get_tree(
        &self,
        reference: &RepositoryReference,
        tree_sha: &str,
        credential: Option<&str>,
    ) -> Result<Vec<TreeEntry>> {
        let url = self.repo_url(reference, &format!("git/trees/{tree_sha}?recursive=1"));
        let resp = self.client.call(Method::GET, &url, credential).await?;
        let body: TreeResponse = resp.json().await?;
        if body.truncated {
            tracing::warn!("Tree listing for {reference} was truncated by GitHub");
        }
        Ok(body.tree)
    }

    async fn list_commits(
        &self,
        reference: &RepositoryReference,
        per_page: u32,
        credential: Option<&str>,
    ) -> Result<Vec<CommitInfo>> {
        let url = self.repo_url(
            reference,
            &format!("commits?sha={}&per_page={per_page}", reference.branch),
        );
        let resp = self.client.call(Method::GET, &url, credential).await?;
        Ok(resp.json().await?)
    }
}
