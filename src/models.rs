use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, FailureReason, Result};

pub const DEFAULT_BRANCH: &str = "main";
pub const LEGACY_DEFAULT_BRANCH: &str = "master";

/// Owner/repo/branch triple parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepositoryReference {
    /// Parse `https://github.com/{owner}/{repo}[.git][/tree/{branch}]`.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidReference(url.to_string());

        let trimmed = url.trim().trim_end_matches('/');
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .ok_or_else(invalid)?;

        let mut parts = without_scheme.split('/');
        let _host = parts.next().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if owner.is_empty() || repo.is_empty() {
            return Err(invalid());
        }

        let branch = match (parts.next(), parts.next()) {
            (Some("tree"), Some(branch)) if !branch.is_empty() => {
                // Branch names may contain slashes
                let rest: Vec<&str> = parts.collect();
                if rest.is_empty() {
                    branch.to_string()
                } else {
                    format!("{branch}/{}", rest.join("/"))
                }
            }
            _ => DEFAULT_BRANCH.to_string(),
        };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch,
        })
    }

    pub fn with_branch(&self, branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            ..self.clone()
        }
    }

    /// `main` falls back to `master` once; explicit branches never do.
    pub fn fallback_branch(&self) -> Option<Self> {
        (self.branch == DEFAULT_BRANCH).then(|| self.with_branch(LEGACY_DEFAULT_BRANCH))
    }
}

impl std::fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A filtered file ready for summarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Indexed file: summary, source and the summary's embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEmbedding {
    pub project_id: Uuid,
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitRecord {
    pub project_id: Uuid,
    pub commit_hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    pub date: DateTime<Utc>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Broad,
    Specific,
}

/// A file selected as answer context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub file_name: String,
    pub source_code: String,
    pub summary: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "files", rename_all = "snake_case")]
pub enum FileCount {
    Exact(usize),
    Estimated(usize),
}

impl FileCount {
    pub fn value(&self) -> usize {
        match self {
            FileCount::Exact(n) | FileCount::Estimated(n) => *n,
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Reference with the branch that actually resolved
    pub reference: RepositoryReference,
    pub file_count: FileCount,
    pub indexed_count: usize,
    pub failed_count: usize,
}

/// A tracked repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub url: String,
    pub reference: RepositoryReference,
    pub status: ProjectStatus,
    pub added_at: DateTime<Utc>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub file_count: Option<FileCount>,
    pub indexed_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Acquiring,
    Embedding,
    Ready,
    Failed {
        reason: FailureReason,
        message: String,
    },
}

impl ProjectStatus {
    pub fn is_busy(&self) -> bool {
        matches!(self, ProjectStatus::Acquiring | ProjectStatus::Embedding)
    }
}

/// Create-project request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub url: String,
    pub token: Option<String>,
}

/// Body for endpoints that optionally take a GitHub token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialRequest {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// File reference sent in the SSE `context` event
#[derive(Debug, Clone, Serialize)]
pub struct ReferencedFile {
    pub file_name: String,
    pub similarity: f32,
}

impl From<&RetrievalHit> for ReferencedFile {
    fn from(hit: &RetrievalHit) -> Self {
        Self {
            file_name: hit.file_name.clone(),
            similarity: hit.similarity,
        }
    }
}
