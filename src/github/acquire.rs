use std::sync::Arc;

use bytes::Bytes;

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::github::api::SourceHost;
use crate::github::archive::{self, UnpackLimits};
use crate::github::filter::FileFilter;
use crate::models::{FileCount, RepositoryReference, SourceFile};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
/// Empirical density of files per archive megabyte.
const FILES_PER_MB: f64 = 60.0;
const MIN_ESTIMATE: usize = 20;
const MAX_ESTIMATE: usize = 2000;
/// Used when the host does not report an archive size.
const UNKNOWN_SIZE_MB: f64 = 2.0;

/// Files retrieved from a repository plus how many it holds.
#[derive(Debug)]
pub struct Acquisition {
    /// Reference with the branch that actually resolved
    pub reference: RepositoryReference,
    pub files: Vec<SourceFile>,
    pub file_count: FileCount,
}

pub fn estimate_file_count(size_mb: f64) -> usize {
    ((size_mb * FILES_PER_MB).round() as usize).clamp(MIN_ESTIMATE, MAX_ESTIMATE)
}

pub struct Acquirer {
    host: Arc<dyn SourceHost>,
    filter: FileFilter,
    max_archive_mb: u64,
    limits: UnpackLimits,
}

impl Acquirer {
    pub fn new(host: Arc<dyn SourceHost>, config: &GitHubConfig) -> Self {
        Self {
            host,
            filter: FileFilter::new(config.max_file_chars),
            max_archive_mb: config.max_archive_mb,
            limits: UnpackLimits {
                max_files: config.max_files,
                chunk_size: config.unpack_chunk_size,
            },
        }
    }

    /// Fetch and filter a repository's files. Without a credential the
    /// archive size is probed first and oversized archives are rejected
    /// before any download; with one, the exact file count comes from the
    /// tree API.
    pub async fn acquire(
        &self,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Result<Acquisition> {
        let result = match credential {
            Some(token) => self.acquire_enumerated(reference, token).await,
            None => self.acquire_estimated(reference).await,
        };
        result.map_err(|e| classify(e, reference, credential.is_some()))
    }

    async fn acquire_estimated(&self, reference: &RepositoryReference) -> Result<Acquisition> {
        let (reference, size, branch_resolved) = match self.probe_with_fallback(reference).await {
            Ok((found, size)) => (found, size, true),
            Err(e @ Error::Upstream { status: 404, .. }) => return Err(e),
            Err(e) => {
                tracing::warn!("Archive probe failed for {reference}, assuming small repo: {e}");
                (reference.clone(), None, false)
            }
        };

        let size_mb = size.map(|b| b as f64 / BYTES_PER_MB).unwrap_or(UNKNOWN_SIZE_MB);
        let estimate = estimate_file_count(size_mb);
        tracing::info!("{reference}@{}: ~{size_mb:.2} MB, ~{estimate} files", reference.branch);

        if size_mb > self.max_archive_mb as f64 {
            return Err(Error::RepositoryTooLarge {
                size_mb,
                limit_mb: self.max_archive_mb,
            });
        }

        let (reference, bytes) = if branch_resolved {
            let bytes = self.host.download_archive(&reference, None).await?;
            (reference, bytes)
        } else {
            self.download_with_fallback(reference).await?
        };
        let files = self.unpack(bytes).await?;
        Ok(Acquisition {
            reference,
            files,
            file_count: FileCount::Estimated(estimate),
        })
    }

    async fn acquire_enumerated(
        &self,
        reference: &RepositoryReference,
        token: &str,
    ) -> Result<Acquisition> {
        let (reference, commit) = match self
            .host
            .get_commit(reference, &reference.branch, Some(token))
            .await
        {
            Ok(commit) => (reference.clone(), commit),
            Err(Error::Upstream { status: 404, .. }) if reference.fallback_branch().is_some() => {
                let fallback = reference.with_branch(crate::models::LEGACY_DEFAULT_BRANCH);
                tracing::info!("Branch {} not found for {reference}, trying {}", reference.branch, fallback.branch);
                let commit = self
                    .host
                    .get_commit(&fallback, &fallback.branch, Some(token))
                    .await?;
                (fallback, commit)
            }
            Err(e) => return Err(e),
        };

        let tree = self
            .host
            .get_tree(&reference, &commit.commit.tree.sha, Some(token))
            .await?;
        let blobs = tree.iter().filter(|e| e.is_blob()).count();
        tracing::info!("{reference}@{}: {blobs} files", reference.branch);

        let bytes = self.host.download_archive(&reference, Some(token)).await?;
        let files = self.unpack(bytes).await?;
        Ok(Acquisition {
            reference,
            files,
            file_count: FileCount::Exact(blobs),
        })
    }

    async fn probe_with_fallback(
        &self,
        reference: &RepositoryReference,
    ) -> Result<(RepositoryReference, Option<u64>)> {
        match self.host.probe_archive(reference).await {
            Ok(size) => Ok((reference.clone(), size)),
            Err(Error::Upstream { status: 404, .. }) if reference.fallback_branch().is_some() => {
                let fallback = reference.with_branch(crate::models::LEGACY_DEFAULT_BRANCH);
                tracing::info!("No archive for {}, trying {}", reference.branch, fallback.branch);
                let size = self.host.probe_archive(&fallback).await?;
                Ok((fallback, size))
            }
            Err(e) => Err(e),
        }
    }

    /// Public download when the probe could not resolve the branch.
    async fn download_with_fallback(
        &self,
        reference: RepositoryReference,
    ) -> Result<(RepositoryReference, Bytes)> {
        match self.host.download_archive(&reference, None).await {
            Ok(bytes) => Ok((reference, bytes)),
            Err(Error::Upstream { status: 404, .. }) if reference.fallback_branch().is_some() => {
                let fallback = reference.with_branch(crate::models::LEGACY_DEFAULT_BRANCH);
                tracing::info!("No archive for {}, trying {}", reference.branch, fallback.branch);
                let bytes = self.host.download_archive(&fallback, None).await?;
                Ok((fallback, bytes))
            }
            Err(e) => Err(e),
        }
    }

    async fn unpack(&self, bytes: Bytes) -> Result<Vec<SourceFile>> {
        let filter = self.filter;
        let limits = self.limits;
        let files =
            tokio::task::spawn_blocking(move || archive::unpack(&bytes, &filter, limits)).await??;
        tracing::info!("Kept {} indexable files from archive", files.len());
        Ok(files)
    }
}

/// Map host status codes to the caller-facing taxonomy.
fn classify(err: Error, reference: &RepositoryReference, credential_supplied: bool) -> Error {
    match err {
        Error::Upstream { status: 404, .. } => Error::RepositoryNotFound {
            reference: reference.to_string(),
            credential_supplied,
        },
        Error::Upstream {
            status: 401 | 403, ..
        } => Error::Unauthorized {
            reference: reference.to_string(),
        },
        other => other,
    }
}
