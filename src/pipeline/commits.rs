use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::CommitConfig;
use crate::error::Result;
use crate::github::api::{CommitInfo, SourceHost};
use crate::github::client::Clock;
use crate::llm::summarize::Summarizer;
use crate::models::{CommitRecord, RepositoryReference};
use crate::store::CommitStore;

/// Stand-in diff when the host cannot return one.
pub const DIFF_UNAVAILABLE: &str = "(Diff not available for this commit.)";
pub const SYNTHETIC_HASH: &str = "latest";
const SYNTHETIC_MESSAGE: &str = "Latest repository state";

/// Commit metadata before summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentCommit {
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_avatar: String,
    pub date: Option<DateTime<Utc>>,
}

impl From<CommitInfo> for RecentCommit {
    fn from(info: CommitInfo) -> Self {
        let (login, avatar) = match info.author {
            Some(user) => (Some(user.login), user.avatar_url),
            None => (None, String::new()),
        };
        let (name, date) = match info.commit.author {
            Some(author) => (Some(author.name), author.date),
            None => (None, None),
        };
        Self {
            hash: info.sha,
            message: info.commit.message,
            author_name: name.or(login).unwrap_or_else(|| "unknown".to_string()),
            author_avatar: avatar,
            date,
        }
    }
}

impl RecentCommit {
    /// Placeholder used when the host will not list commits at all.
    pub fn synthetic(reference: &RepositoryReference) -> Self {
        Self {
            hash: SYNTHETIC_HASH.to_string(),
            message: SYNTHETIC_MESSAGE.to_string(),
            author_name: reference.owner.clone(),
            author_avatar: format!("https://github.com/{}.png", reference.owner),
            date: None,
        }
    }
}

/// Lists recent commits, summarizes the unseen ones and stores them.
pub struct CommitPoller {
    host: Arc<dyn SourceHost>,
    store: Arc<dyn CommitStore>,
    summarizer: Summarizer,
    clock: Arc<dyn Clock>,
    config: CommitConfig,
}

impl CommitPoller {
    pub fn new(
        host: Arc<dyn SourceHost>,
        store: Arc<dyn CommitStore>,
        summarizer: Summarizer,
        clock: Arc<dyn Clock>,
        config: CommitConfig,
    ) -> Self {
        Self {
            host,
            store,
            summarizer,
            clock,
            config,
        }
    }

    /// Returns the records written by this call, newest first.
    pub async fn poll(
        &self,
        project_id: Uuid,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Result<Vec<CommitRecord>> {
        let known = self.store.hashes(project_id);
        let fresh: Vec<RecentCommit> = self
            .list_recent(reference, credential)
            .await
            .into_iter()
            .filter(|c| !known.contains(&c.hash))
            .collect();

        if fresh.is_empty() {
            tracing::debug!("No new commits for {reference}");
            return Ok(Vec::new());
        }
        tracing::info!("Summarizing {} new commits for {reference}", fresh.len());

        let delay = Duration::from_millis(self.config.delay_ms);
        let mut written = Vec::with_capacity(fresh.len());
        for (i, commit) in fresh.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                self.clock.sleep(delay).await;
            }
            let record = self.summarize(project_id, reference, credential, commit).await;
            if self.store.insert(record.clone())? {
                written.push(record);
            }
        }
        Ok(written)
    }

    async fn list_recent(
        &self,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Vec<RecentCommit> {
        if let Some(token) = credential {
            match self
                .host
                .list_commits(reference, self.config.per_page_authenticated, Some(token))
                .await
            {
                Ok(commits) => return commits.into_iter().map(RecentCommit::from).collect(),
                Err(e) => tracing::warn!("Authenticated commit listing failed for {reference}: {e}"),
            }
        }

        match self
            .host
            .list_commits(reference, self.config.per_page_public, None)
            .await
        {
            Ok(commits) => commits.into_iter().map(RecentCommit::from).collect(),
            Err(e) => {
                tracing::warn!("Public commit listing failed for {reference}, using placeholder: {e}");
                vec![RecentCommit::synthetic(reference)]
            }
        }
    }

    async fn summarize(
        &self,
        project_id: Uuid,
        reference: &RepositoryReference,
        credential: Option<&str>,
        commit: RecentCommit,
    ) -> CommitRecord {
        let diff = if commit.hash == SYNTHETIC_HASH {
            DIFF_UNAVAILABLE.to_string()
        } else {
            match self.host.get_commit_diff(reference, &commit.hash, credential).await {
                Ok(diff) if !diff.trim().is_empty() => diff,
                Ok(_) => DIFF_UNAVAILABLE.to_string(),
                Err(e) => {
                    tracing::warn!("Diff unavailable for {}: {e}", commit.hash);
                    DIFF_UNAVAILABLE.to_string()
                }
            }
        };

        let summary = match self.summarizer.summarize_diff(&commit.message, &diff).await {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) => commit.message.clone(),
            Err(e) => {
                tracing::warn!("Commit summary failed for {}, keeping message: {e}", commit.hash);
                commit.message.clone()
            }
        };

        CommitRecord {
            project_id,
            commit_hash: commit.hash,
            message: commit.message,
            author_name: commit.author_name,
            author_avatar: commit.author_avatar,
            date: commit.date.unwrap_or_else(|| self.clock.now()),
            summary,
        }
    }
}
