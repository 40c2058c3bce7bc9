//! Error taxonomy for ingestion, retrieval and commit polling.
//!
//! Every library operation returns [`Result`]. The HTTP layer and the binary
//! convert into `(StatusCode, String)` and `anyhow::Error` respectively.

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository URL could not be parsed into owner/repo.
    #[error("Invalid repository reference: {0}")]
    InvalidReference(String),

    /// Size policy rejection, raised before any archive download.
    #[error("Repository too large ({size_mb:.1} MB, limit {limit_mb} MB). Provide an access token to index it")]
    RepositoryTooLarge { size_mb: f64, limit_mb: u64 },

    #[error("{}", not_found_message(.reference, .credential_supplied))]
    RepositoryNotFound {
        reference: String,
        credential_supplied: bool,
    },

    #[error("Access denied for {reference}: the token is missing the required scope or is invalid")]
    Unauthorized { reference: String },

    /// Rate limited twice in a row on the same call.
    #[error("GitHub API rate limit exceeded for {endpoint}")]
    RateLimited { endpoint: String },

    #[error("GitHub API returned {status} for {endpoint}")]
    Upstream { endpoint: String, status: u16 },

    /// A single model provider failed.
    #[error("{provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// Every provider in a fallback chain failed.
    #[error("All providers failed for {capability}: {}", .attempts.join("; "))]
    ProviderFailure {
        capability: &'static str,
        attempts: Vec<String>,
    },

    /// Files were found but none could be summarized and embedded.
    #[error("None of the {attempted} files could be indexed")]
    NothingIndexed { attempted: usize },

    #[error("Repository contains no indexable files")]
    EmptyRepository,

    #[error("Project {0} not found")]
    ProjectNotFound(uuid::Uuid),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn not_found_message(reference: &str, credential_supplied: &bool) -> String {
    if *credential_supplied {
        format!("Repository {reference} not found")
    } else {
        format!(
            "Repository {reference} not found. If it is private, provide an access token"
        )
    }
}

/// What the caller should do about a failed ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    TooLarge,
    NeedsCredential,
    NotFound,
    RateLimited,
    Provider,
    Other,
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn remediation(&self) -> FailureReason {
        match self {
            Error::RepositoryTooLarge { .. } => FailureReason::TooLarge,
            Error::RepositoryNotFound {
                credential_supplied: false,
                ..
            }
            | Error::Unauthorized { .. } => FailureReason::NeedsCredential,
            Error::RepositoryNotFound { .. } | Error::InvalidReference(_) => {
                FailureReason::NotFound
            }
            Error::RateLimited { .. } => FailureReason::RateLimited,
            Error::Provider { .. } | Error::ProviderFailure { .. } | Error::NothingIndexed { .. } => {
                FailureReason::Provider
            }
            _ => FailureReason::Other,
        }
    }
}
