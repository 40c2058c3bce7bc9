use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::Config;
use crate::error::FailureReason;
use crate::github::{GitHubApi, RateLimitPolicy, RateLimitedClient, SourceHost, SystemClock};
use crate::models::{Project, ProjectStatus};
use crate::pipeline::{Pipeline, Providers};
use crate::store::{CommitStore, InMemoryCommitStore, InMemoryVectorIndex, VectorIndex};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub projects: Arc<RwLock<Vec<Project>>>,
    pub pipeline: Arc<Pipeline>,
    pub vectors: Arc<dyn VectorIndex>,
    pub commits: Arc<dyn CommitStore>,
    pub ingest_semaphore: Arc<tokio::sync::Semaphore>,
    pub ask_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let clock = Arc::new(SystemClock);
        let github = Arc::new(RateLimitedClient::new(
            http_client.clone(),
            clock.clone(),
            RateLimitPolicy::from(&config.github),
        ));
        let host: Arc<dyn SourceHost> = Arc::new(GitHubApi::new(
            github,
            &config.github.api_base,
            &config.github.archive_base,
        ));
        let providers = Providers::from_config(&http_client, &config.llm)?;
        let vectors: Arc<dyn VectorIndex> =
            Arc::new(InMemoryVectorIndex::open_or_create(&config.vector_dir())?);
        let commits: Arc<dyn CommitStore> =
            Arc::new(InMemoryCommitStore::open_or_create(&config.commit_dir())?);

        let pipeline = Pipeline::new(&config, providers, host, vectors.clone(), commits.clone(), clock);
        let projects = load_projects(&config);
        Ok(Self::from_parts(config, projects, pipeline, vectors, commits))
    }

    /// Assemble state around an existing pipeline and stores.
    pub fn from_parts(
        config: Config,
        projects: Vec<Project>,
        pipeline: Pipeline,
        vectors: Arc<dyn VectorIndex>,
        commits: Arc<dyn CommitStore>,
    ) -> Self {
        let ingest_permits = config.max_concurrent_ingests.max(1);
        let ask_permits = config.max_concurrent_asks.max(1);
        Self {
            config,
            projects: Arc::new(RwLock::new(projects)),
            pipeline: Arc::new(pipeline),
            vectors,
            commits,
            ingest_semaphore: Arc::new(tokio::sync::Semaphore::new(ingest_permits)),
            ask_semaphore: Arc::new(tokio::sync::Semaphore::new(ask_permits)),
        }
    }

    pub fn project(&self, id: uuid::Uuid) -> Option<Project> {
        self.projects.read().iter().find(|p| p.id == id).cloned()
    }

    /// A request token wins over the configured default.
    pub fn credential(&self, supplied: Option<String>) -> Option<String> {
        supplied
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| self.config.github.token.clone())
    }

    /// Persist project list to disk (atomic write via temp file + rename).
    pub fn persist_projects(&self) {
        let projects = self.projects.read();
        let db_path = self.config.db_path();
        let result = serde_json::to_string_pretty(&*projects)
            .map_err(std::io::Error::from)
            .and_then(|data| {
                let tmp_path = db_path.with_extension("json.tmp");
                std::fs::write(&tmp_path, data)?;
                std::fs::rename(&tmp_path, &db_path)
            });
        if let Err(e) = result {
            tracing::warn!("Failed to persist projects to {}: {e}", db_path.display());
        }
    }
}

/// Projects left mid-ingest by a restart are marked failed.
fn load_projects(config: &Config) -> Vec<Project> {
    let path = config.db_path();
    let mut projects: Vec<Project> = match std::fs::read_to_string(&path) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable {}: {e}", path.display());
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };
    for project in projects.iter_mut().filter(|p| p.status.is_busy()) {
        project.status = ProjectStatus::Failed {
            reason: FailureReason::Other,
            message: "Ingestion was interrupted by a restart".to_string(),
        };
    }
    projects
}
