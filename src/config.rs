use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where project metadata, vectors and commits are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
    pub commits: CommitConfig,
    /// Maximum number of projects allowed
    pub max_projects: usize,
    /// Maximum concurrent ingestions
    pub max_concurrent_ingests: usize,
    /// Maximum concurrent question streams
    pub max_concurrent_asks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base, e.g. "https://api.github.com"
    pub api_base: String,
    /// Host serving `/{owner}/{repo}/archive/{branch}.zip`
    pub archive_base: String,
    /// Token used when a request does not carry its own
    pub token: Option<String>,
    /// Sleep until reset once remaining quota drops below this
    pub quota_threshold: u32,
    /// Extra wait past the reported reset time, in seconds
    pub quota_buffer_secs: u64,
    /// Wait before the single retry after a rate-limit response, in seconds
    pub rate_limit_cooldown_secs: u64,
    /// Unauthenticated archives above this size are rejected before download
    pub max_archive_mb: u64,
    /// Maximum files kept from one archive
    pub max_files: usize,
    /// Files longer than this many characters are dropped
    pub max_file_chars: usize,
    /// Archive entries visited per unpacking chunk
    pub unpack_chunk_size: usize,
}

/// One model backend. `provider` is "ollama" or "openai" (any
/// OpenAI-compatible API: OpenAI, OpenRouter, Groq, llama-server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    pub base_url: String,
    /// Model for summaries and answers
    pub chat_model: String,
    /// Cheap model for question classification
    pub fast_model: String,
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub primary: ProviderConfig,
    /// Tried after the primary fails for any capability
    pub fallback: Option<ProviderConfig>,
    /// Answer streams idle longer than this fall back to a plain completion
    pub stream_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Files summarized and embedded at once
    pub concurrency: usize,
    /// Stored vector width; provider output is truncated or zero-padded to it
    pub embedding_dim: usize,
    /// Characters of source sent to the summary prompt
    pub summary_input_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Hits must score strictly above this
    pub similarity_floor: f32,
    pub anchor_limit: usize,
    /// Files used when a broad question finds nothing
    pub fallback_files: usize,
    pub max_listing_chars: usize,
    pub max_file_context_chars: usize,
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Pause between processing consecutive commits, in milliseconds
    pub delay_ms: u64,
    pub per_page_authenticated: u32,
    pub per_page_public: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9000".to_string(),
            github: GitHubConfig::default(),
            llm: LlmConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            commits: CommitConfig::default(),
            max_projects: 50,
            max_concurrent_ingests: 2,
            max_concurrent_asks: 3,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            archive_base: "https://github.com".to_string(),
            token: None,
            quota_threshold: 10,
            quota_buffer_secs: 1,
            rate_limit_cooldown_secs: 60,
            max_archive_mb: 15,
            max_files: 1000,
            max_file_chars: 100_000,
            unpack_chunk_size: 100,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            fast_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: ProviderConfig::default(),
            fallback: None,
            stream_idle_timeout_secs: 30,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            embedding_dim: 768,
            summary_input_chars: 10_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_floor: 0.3,
            anchor_limit: 5,
            fallback_files: 10,
            max_listing_chars: 5_000,
            max_file_context_chars: 6_000,
            max_context_chars: 48_000,
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            per_page_authenticated: 10,
            per_page_public: 5,
        }
    }
}

/// Overwrite `target` when `key` is set and parses.
fn parse_env<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        match val.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!("Ignoring unparseable {key}={val}"),
        }
    }
}

impl ProviderConfig {
    /// Read `{prefix}_PROVIDER`, `{prefix}_BASE_URL`, ... over `self`.
    fn apply_env(&mut self, prefix: &str) {
        if let Ok(provider) = std::env::var(format!("{prefix}_PROVIDER")) {
            self.provider = provider;
        }
        if let Ok(url) = std::env::var(format!("{prefix}_BASE_URL")) {
            self.base_url = url;
        }
        if let Ok(model) = std::env::var(format!("{prefix}_CHAT_MODEL")) {
            self.chat_model = model.clone();
            self.fast_model = model;
        }
        if let Ok(model) = std::env::var(format!("{prefix}_FAST_MODEL")) {
            self.fast_model = model;
        }
        if let Ok(model) = std::env::var(format!("{prefix}_EMBEDDING_MODEL")) {
            self.embedding_model = model;
        }
        if let Ok(key) = std::env::var(format!("{prefix}_API_KEY")) {
            self.api_key = Some(key);
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("REPO_QA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REPO_QA_BIND_ADDR") {
            config.bind_addr = addr;
        }
        parse_env("REPO_QA_MAX_PROJECTS", &mut config.max_projects);
        parse_env("REPO_QA_MAX_CONCURRENT_INGESTS", &mut config.max_concurrent_ingests);
        parse_env("REPO_QA_MAX_CONCURRENT_ASKS", &mut config.max_concurrent_asks);

        // GitHub
        if let Ok(url) = std::env::var("GITHUB_API_BASE") {
            config.github.api_base = url;
        }
        if let Ok(url) = std::env::var("GITHUB_ARCHIVE_BASE") {
            config.github.archive_base = url;
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                config.github.token = Some(token);
            }
        }
        parse_env("GITHUB_QUOTA_THRESHOLD", &mut config.github.quota_threshold);
        parse_env("GITHUB_QUOTA_BUFFER_SECS", &mut config.github.quota_buffer_secs);
        parse_env(
            "GITHUB_RATE_LIMIT_COOLDOWN_SECS",
            &mut config.github.rate_limit_cooldown_secs,
        );
        parse_env("REPO_QA_MAX_ARCHIVE_MB", &mut config.github.max_archive_mb);
        parse_env("REPO_QA_MAX_FILES", &mut config.github.max_files);
        parse_env("REPO_QA_MAX_FILE_CHARS", &mut config.github.max_file_chars);

        // Model providers
        config.llm.primary.apply_env("LLM");
        if std::env::var("LLM_FALLBACK_PROVIDER").is_ok() {
            let mut fallback = config.llm.primary.clone();
            fallback.api_key = None;
            fallback.apply_env("LLM_FALLBACK");
            config.llm.fallback = Some(fallback);
        }
        parse_env(
            "LLM_STREAM_IDLE_TIMEOUT_SECS",
            &mut config.llm.stream_idle_timeout_secs,
        );

        // Ingestion and retrieval
        parse_env("LLM_EMBEDDING_DIM", &mut config.ingest.embedding_dim);
        parse_env("REPO_QA_INGEST_CONCURRENCY", &mut config.ingest.concurrency);
        config.ingest.concurrency = config.ingest.concurrency.max(1);
        parse_env("REPO_QA_TOP_K", &mut config.retrieval.top_k);
        parse_env("REPO_QA_SIMILARITY_FLOOR", &mut config.retrieval.similarity_floor);
        parse_env("REPO_QA_COMMIT_DELAY_MS", &mut config.commits.delay_ms);

        config
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn commit_dir(&self) -> PathBuf {
        self.data_dir.join("commits")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("projects.json")
    }
}

impl GitHubConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn quota_buffer(&self) -> Duration {
        Duration::from_secs(self.quota_buffer_secs)
    }
}
