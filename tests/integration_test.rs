//! Integration tests for the ingest, ask and commit-poll flows.
//!
//! Models and the source host are replaced by in-process fakes, so no
//! network access or running LLM is required.

use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use uuid::Uuid;

use repo_qa::config::Config;
use repo_qa::error::{Error, Result};
use repo_qa::github::api::{CommitInfo, SourceHost, TreeEntry};
use repo_qa::github::Clock;
use repo_qa::llm::{
    Embedder, ModelRole, Prompt, Provider, ProviderChain, StreamingGenerator, TextGenerator,
    TextStream,
};
use repo_qa::models::{FileCount, QuestionKind, RepositoryReference};
use repo_qa::pipeline::{AnswerChunk, Pipeline, Providers};
use repo_qa::state::AppState;
use repo_qa::store::{CommitStore, InMemoryCommitStore, InMemoryVectorIndex, VectorIndex};

const DIM: usize = 768;
const MB: u64 = 1024 * 1024;

// ─── Fakes ───────────────────────────────────────────────

#[derive(Clone, Copy)]
enum StreamMode {
    Full,
    StallAfterFirst,
}

/// Deterministic model: summaries echo the path, embeddings are one-hot
/// by topic ("auth", "zzz", everything else).
struct FakeModel {
    classify_reply: Option<&'static str>,
    stream_mode: StreamMode,
    completions: AtomicUsize,
}

impl FakeModel {
    fn new(classify_reply: Option<&'static str>, stream_mode: StreamMode) -> Arc<Self> {
        Arc::new(Self {
            classify_reply,
            stream_mode,
            completions: AtomicUsize::new(0),
        })
    }
}

fn one_hot(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

fn file_path_in(prompt: &str) -> &str {
    prompt
        .split("File: ")
        .nth(1)
        .and_then(|rest| rest.lines().next())
        .unwrap_or("unknown")
}

impl Provider for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }
}

#[async_trait]
impl TextGenerator for FakeModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        if prompt.role == ModelRole::Fast {
            return self
                .classify_reply
                .map(str::to_string)
                .ok_or_else(|| Error::provider("fake", "classifier offline"));
        }
        if prompt.user.contains("poison") {
            return Err(Error::provider("fake", "content rejected"));
        }
        if prompt.user.starts_with("Summarize the following git commit") {
            return Ok("* Touched the parser".to_string());
        }
        if prompt.user.contains("Question:") && !prompt.user.contains("File: ") {
            return Ok("Complete answer from fallback".to_string());
        }
        let path = file_path_in(&prompt.user);
        let topic = if prompt.user.contains("auth") { " handles auth" } else { "" };
        Ok(format!("  Summary of {path}{topic}  "))
    }
}

#[async_trait]
impl StreamingGenerator for FakeModel {
    async fn stream(&self, _prompt: &Prompt) -> Result<TextStream> {
        let head = stream::iter(vec![Ok("The answer ".to_string())]);
        match self.stream_mode {
            StreamMode::Full => Ok(Box::pin(head.chain(stream::iter(vec![Ok(
                "is here.".to_string(),
            )])))),
            StreamMode::StallAfterFirst => Ok(Box::pin(head.chain(stream::pending()))),
        }
    }
}

#[async_trait]
impl Embedder for FakeModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        // Fewer dimensions than stored, to exercise padding
        let mut v = if lower.contains("zzz") {
            one_hot(2)
        } else if lower.contains("auth") {
            one_hot(0)
        } else {
            one_hot(1)
        };
        v.truncate(16);
        Ok(v)
    }
}

struct FakeHost {
    archive: Vec<u8>,
    archive_size: Option<u64>,
    missing_branches: Vec<&'static str>,
    tree: Vec<(&'static str, &'static str)>,
    commits: Vec<serde_json::Value>,
    listing_fails: bool,
    probe_fails: bool,
    download_delay: Option<Duration>,
    downloads: AtomicUsize,
    diff_requests: AtomicUsize,
}

impl FakeHost {
    fn with_archive(archive: Vec<u8>) -> Self {
        Self {
            archive,
            archive_size: None,
            missing_branches: Vec::new(),
            tree: Vec::new(),
            commits: Vec::new(),
            listing_fails: false,
            probe_fails: false,
            download_delay: None,
            downloads: AtomicUsize::new(0),
            diff_requests: AtomicUsize::new(0),
        }
    }

    fn missing(&self, reference: &RepositoryReference) -> Result<()> {
        if self.missing_branches.contains(&reference.branch.as_str()) {
            return Err(Error::Upstream {
                endpoint: format!("{reference}@{}", reference.branch),
                status: 404,
            });
        }
        Ok(())
    }
}

fn commit_json(sha: &str, message: &str, patch: Option<&str>) -> serde_json::Value {
    let files = match patch {
        Some(p) => serde_json::json!([{ "filename": "src/parser.rs", "patch": p }]),
        None => serde_json::json!([]),
    };
    serde_json::json!({
        "sha": sha,
        "commit": {
            "message": message,
            "author": { "name": "Ada", "date": "2024-05-01T10:00:00Z" },
            "tree": { "sha": "tree-1" }
        },
        "author": { "login": "ada", "avatar_url": "https://avatars.example/ada" },
        "files": files
    })
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn probe_archive(&self, reference: &RepositoryReference) -> Result<Option<u64>> {
        if self.probe_fails {
            return Err(Error::Upstream {
                endpoint: format!("{reference} archive probe"),
                status: 502,
            });
        }
        self.missing(reference)?;
        Ok(self.archive_size)
    }

    async fn download_archive(
        &self,
        reference: &RepositoryReference,
        _credential: Option<&str>,
    ) -> Result<Bytes> {
        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }
        self.missing(reference)?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(self.archive.clone()))
    }

    async fn get_commit(
        &self,
        reference: &RepositoryReference,
        git_ref: &str,
        _credential: Option<&str>,
    ) -> Result<CommitInfo> {
        if git_ref == reference.branch {
            self.missing(reference)?;
            return Ok(serde_json::from_value(commit_json("head", "head", None))?);
        }
        self.diff_requests.fetch_add(1, Ordering::SeqCst);
        let found = self
            .commits
            .iter()
            .find(|c| c["sha"] == git_ref)
            .cloned()
            .ok_or_else(|| Error::Upstream {
                endpoint: git_ref.to_string(),
                status: 404,
            })?;
        Ok(serde_json::from_value(found)?)
    }

    async fn get_tree(
        &self,
        _reference: &RepositoryReference,
        _tree_sha: &str,
        _credential: Option<&str>,
    ) -> Result<Vec<TreeEntry>> {
        Ok(self
            .tree
            .iter()
            .map(|(path, kind)| TreeEntry {
                path: path.to_string(),
                kind: kind.to_string(),
            })
            .collect())
    }

    async fn list_commits(
        &self,
        _reference: &RepositoryReference,
        per_page: u32,
        _credential: Option<&str>,
    ) -> Result<Vec<CommitInfo>> {
        if self.listing_fails {
            return Err(Error::Upstream {
                endpoint: "commits".into(),
                status: 500,
            });
        }
        self.commits
            .iter()
            .take(per_page as usize)
            .map(|c| serde_json::from_value(c.clone()).map_err(Error::from))
            .collect()
    }
}

/// Records sleeps instead of performing them.
#[derive(Default)]
struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

// ─── Helpers ─────────────────────────────────────────────

fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer
            .start_file(format!("demo-main/{name}"), options)
            .unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn sample_archive() -> Vec<u8> {
    build_zip(&[
        ("README.md", "# Demo\nA small service."),
        ("src/main.rs", "fn main() { server::run(); }"),
        ("src/auth.rs", "pub fn check_auth(token: &str) -> bool { !token.is_empty() }"),
        ("assets/logo.png", "\u{0}\u{1}"),
    ])
}

fn providers(model: Arc<FakeModel>) -> Providers {
    let text: Vec<Arc<dyn TextGenerator>> = vec![model.clone()];
    let streaming: Vec<Arc<dyn StreamingGenerator>> = vec![model.clone()];
    let embedding: Vec<Arc<dyn Embedder>> = vec![model];
    Providers {
        text: ProviderChain::new("completion", text),
        streaming: ProviderChain::new("streaming", streaming),
        embedding: ProviderChain::new("embedding", embedding),
    }
}

struct Harness {
    pipeline: Pipeline,
    host: Arc<FakeHost>,
    vectors: Arc<InMemoryVectorIndex>,
    commits: Arc<InMemoryCommitStore>,
    clock: Arc<RecordingClock>,
    reference: RepositoryReference,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.llm.stream_idle_timeout_secs = 1;
    config
}

fn harness_with(config: &Config, host: FakeHost, model: Arc<FakeModel>) -> Harness {
    let host = Arc::new(host);
    let vectors = Arc::new(InMemoryVectorIndex::in_memory());
    let commits = Arc::new(InMemoryCommitStore::in_memory());
    let clock = Arc::new(RecordingClock::default());
    let pipeline = Pipeline::new(
        config,
        providers(model),
        host.clone(),
        vectors.clone(),
        commits.clone(),
        clock.clone(),
    );
    Harness {
        pipeline,
        host,
        vectors,
        commits,
        clock,
        reference: RepositoryReference::parse("https://github.com/acme/demo").unwrap(),
    }
}

fn harness(host: FakeHost, model: Arc<FakeModel>) -> Harness {
    harness_with(&test_config(), host, model)
}

fn default_model() -> Arc<FakeModel> {
    FakeModel::new(Some("specific"), StreamMode::Full)
}

async fn collect_answer(chunks: repo_qa::pipeline::AnswerStream) -> Vec<AnswerChunk> {
    chunks.map(|c| c.unwrap()).collect().await
}

// ─── Ingestion ───────────────────────────────────────────

/// Filtered files are indexed once; a second run replaces them in place.
#[tokio::test]
async fn test_ingest_indexes_filtered_files_idempotently() {
    let h = harness(FakeHost::with_archive(sample_archive()), default_model());
    let project = Uuid::new_v4();

    let first = h.pipeline.ingest(project, &h.reference, None).await.unwrap();
    assert_eq!(first.indexed_count, 3);
    assert_eq!(first.failed_count, 0);
    // Unknown size is treated as a 2 MB archive
    assert_eq!(first.file_count, FileCount::Estimated(120));

    let second = h.pipeline.ingest(project, &h.reference, None).await.unwrap();
    assert_eq!(second.indexed_count, 3);
    assert_eq!(h.vectors.count(project), 3);
    assert_eq!(h.vectors.entry_count(), 3);

    let mut names = h.vectors.file_names(project);
    names.sort();
    assert_eq!(names, vec!["README.md", "src/auth.rs", "src/main.rs"]);

    let readme = &h.vectors.find_by_names(project, &["README.md"])[0];
    assert_eq!(readme.summary, "Summary of README.md");
    assert_eq!(readme.source_code, "# Demo\nA small service.");
}

/// One bad file out of ten leaves nine records and one counted failure.
#[tokio::test]
async fn test_ingest_skips_failing_file() {
    let contents: Vec<(String, String)> = (0..10)
        .map(|i| {
            let body = if i == 3 { "// poison".to_string() } else { format!("fn f{i}() {{}}") };
            (format!("src/f{i}.rs"), body)
        })
        .collect();
    let entries: Vec<(&str, &str)> = contents
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    let h = harness(FakeHost::with_archive(build_zip(&entries)), default_model());
    let project = Uuid::new_v4();

    let report = h.pipeline.ingest(project, &h.reference, None).await.unwrap();
    assert_eq!(report.indexed_count, 9);
    assert_eq!(report.failed_count, 1);
    assert!(h.vectors.find_by_names(project, &["src/f3.rs"]).is_empty());
}

#[tokio::test]
async fn test_oversized_public_archive_rejected_before_download() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.archive_size = Some(20 * MB);
    let h = harness(host, default_model());

    let err = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RepositoryTooLarge { limit_mb: 15, .. }));
    assert_eq!(h.host.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_main_falls_back_to_master() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.missing_branches = vec!["main"];
    host.archive_size = Some(MB);
    let h = harness(host, default_model());

    let report = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap();
    assert_eq!(report.reference.branch, "master");
    assert_eq!(report.file_count, FileCount::Estimated(60));
}

/// A failed size probe still tries `master` when `main` has no archive.
#[tokio::test]
async fn test_failed_probe_download_falls_back_to_master() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.missing_branches = vec!["main"];
    host.probe_fails = true;
    let h = harness(host, default_model());

    let report = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap();
    assert_eq!(report.reference.branch, "master");
    assert_eq!(report.file_count, FileCount::Estimated(120));
    assert_eq!(report.indexed_count, 3);
    assert_eq!(h.host.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_repository_hints_at_token() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.missing_branches = vec!["main", "master"];
    let h = harness(host, default_model());

    let err = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::RepositoryNotFound {
            credential_supplied: false,
            ..
        }
    ));
}

/// With a credential the count comes from blob entries in the tree.
#[tokio::test]
async fn test_credentialed_ingest_counts_tree_blobs() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.archive_size = Some(50 * MB);
    host.tree = vec![
        ("src", "tree"),
        ("src/main.rs", "blob"),
        ("src/auth.rs", "blob"),
        ("README.md", "blob"),
        ("vendor/lib", "commit"),
    ];
    let h = harness(host, default_model());

    let report = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, Some("ghp_test"))
        .await
        .unwrap();
    assert_eq!(report.file_count, FileCount::Exact(3));
    assert_eq!(h.host.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repository_without_indexable_files() {
    let archive = build_zip(&[("logo.png", "\u{0}"), ("node_modules/x/index.js", "x")]);
    let h = harness(FakeHost::with_archive(archive), default_model());
    let err = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyRepository));
}

#[tokio::test]
async fn test_nothing_indexed_when_every_file_fails() {
    let archive = build_zip(&[("a.rs", "// poison"), ("b.rs", "// poison")]);
    let h = harness(FakeHost::with_archive(archive), default_model());
    let err = h
        .pipeline
        .ingest(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NothingIndexed { attempted: 2 }));
}

// ─── Questions ───────────────────────────────────────────

#[tokio::test]
async fn test_specific_question_streams_deltas() {
    let h = harness(FakeHost::with_archive(sample_archive()), default_model());
    let project = Uuid::new_v4();
    h.pipeline.ingest(project, &h.reference, None).await.unwrap();

    let answer = h.pipeline.ask(project, "Where is auth checked?").await;
    assert_eq!(answer.kind, QuestionKind::Specific);
    let names: Vec<&str> = answer
        .references
        .iter()
        .map(|r| r.file_name.as_str())
        .collect();
    assert_eq!(names, vec!["src/auth.rs"]);

    let chunks = collect_answer(answer.stream).await;
    assert_eq!(
        chunks,
        vec![
            AnswerChunk::Delta("The answer ".into()),
            AnswerChunk::Delta("is here.".into())
        ]
    );
}

/// A broad question with nothing above the floor still gets context.
#[tokio::test]
async fn test_broad_question_without_hits_uses_anchors_and_fallback() {
    let h = harness(
        FakeHost::with_archive(sample_archive()),
        FakeModel::new(Some("broad"), StreamMode::Full),
    );
    let project = Uuid::new_v4();
    h.pipeline.ingest(project, &h.reference, None).await.unwrap();

    let answer = h.pipeline.ask(project, "zzz give me an overview").await;
    assert_eq!(answer.kind, QuestionKind::Broad);
    assert!(!answer.references.is_empty());

    let readme = answer
        .references
        .iter()
        .find(|r| r.file_name == "README.md")
        .unwrap();
    assert_eq!(readme.similarity, 1.0);
    assert!(answer
        .references
        .iter()
        .any(|r| r.file_name == "src/auth.rs" && r.similarity == 0.5));

    let mut names: Vec<&str> = answer.references.iter().map(|r| r.file_name.as_str()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), answer.references.len(), "no duplicate files");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_stream_ends_with_complete_answer() {
    let model = FakeModel::new(Some("specific"), StreamMode::StallAfterFirst);
    let h = harness(FakeHost::with_archive(sample_archive()), model.clone());
    let project = Uuid::new_v4();
    h.pipeline.ingest(project, &h.reference, None).await.unwrap();

    let answer = h.pipeline.ask(project, "Where is auth checked?").await;
    let chunks = collect_answer(answer.stream).await;
    assert_eq!(chunks.first(), Some(&AnswerChunk::Delta("The answer ".into())));
    assert_eq!(
        chunks.last(),
        Some(&AnswerChunk::Complete("Complete answer from fallback".into()))
    );
    // Three summaries, one classification, one fallback answer
    assert_eq!(model.completions.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_classifier_outage_falls_back_to_heuristic() {
    let h = harness(
        FakeHost::with_archive(sample_archive()),
        FakeModel::new(None, StreamMode::Full),
    );
    let project = Uuid::new_v4();
    h.pipeline.ingest(project, &h.reference, None).await.unwrap();

    let broad = h.pipeline.ask(project, "Explain the architecture").await;
    assert_eq!(broad.kind, QuestionKind::Broad);
    let specific = h.pipeline.ask(project, "fix the bug in line 42 of auth.rs").await;
    assert_eq!(specific.kind, QuestionKind::Specific);
}

#[tokio::test]
async fn test_explicit_specific_answer_beats_heuristic() {
    let h = harness(FakeHost::with_archive(sample_archive()), default_model());
    let answer = h
        .pipeline
        .ask(Uuid::new_v4(), "Explain the architecture of auth")
        .await;
    assert_eq!(answer.kind, QuestionKind::Specific);
}

// ─── Commits ─────────────────────────────────────────────

#[tokio::test]
async fn test_commit_poll_is_incremental() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.commits = vec![
        commit_json("c2", "Fix parser", Some("@@ -1 +1 @@\n-a\n+b")),
        commit_json("c1", "Initial commit", Some("@@ -0,0 +1 @@\n+a")),
    ];
    let h = harness(host, default_model());
    let project = Uuid::new_v4();

    let first = h
        .pipeline
        .poll_commits(project, &h.reference, None)
        .await
        .unwrap();
    let hashes: Vec<&str> = first.iter().map(|c| c.commit_hash.as_str()).collect();
    assert_eq!(hashes, vec!["c2", "c1"], "API order is kept");
    assert_eq!(first[0].summary, "* Touched the parser");
    assert_eq!(first[0].author_name, "Ada");
    assert_eq!(h.clock.sleeps.lock().len(), 1, "one pause between two commits");

    let second = h
        .pipeline
        .poll_commits(project, &h.reference, None)
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(h.commits.list(project).len(), 2);
    assert_eq!(h.host.diff_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_commit_summary_failure_keeps_message() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.commits = vec![commit_json("c1", "poison pill", Some("+x"))];
    let h = harness(host, default_model());

    let records = h
        .pipeline
        .poll_commits(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap();
    assert_eq!(records[0].summary, "poison pill");
}

#[tokio::test]
async fn test_public_listing_respects_page_size() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.commits = (0..8)
        .map(|i| commit_json(&format!("c{i}"), "change", None))
        .collect();
    let h = harness(host, default_model());

    let public = h
        .pipeline
        .poll_commits(Uuid::new_v4(), &h.reference, None)
        .await
        .unwrap();
    assert_eq!(public.len(), 5);

    let authenticated = h
        .pipeline
        .poll_commits(Uuid::new_v4(), &h.reference, Some("ghp_test"))
        .await
        .unwrap();
    assert_eq!(authenticated.len(), 8);
}

#[tokio::test]
async fn test_unlistable_commits_use_placeholder() {
    let mut host = FakeHost::with_archive(sample_archive());
    host.listing_fails = true;
    let h = harness(host, default_model());

    let records = h
        .pipeline
        .poll_commits(Uuid::new_v4(), &h.reference, Some("ghp_test"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].commit_hash, "latest");
    assert_eq!(records[0].message, "Latest repository state");
    assert_eq!(records[0].author_avatar, "https://github.com/acme.png");
    assert_eq!(h.host.diff_requests.load(Ordering::SeqCst), 0);
}

// ─── HTTP ────────────────────────────────────────────────

/// Create a project over HTTP, wait for ingestion, then ask over SSE.
#[tokio::test]
async fn test_http_project_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let (base, _) = serve_app(dir.path(), FakeHost::with_archive(sample_archive())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/projects"))
        .json(&serde_json::json!({ "url": "https://github.com/acme/demo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let duplicate = client
        .post(format!("{base}/projects"))
        .json(&serde_json::json!({ "url": "https://github.com/acme/demo/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 409);

    let project = wait_until_ready(&client, &base, &id).await;
    assert_eq!(project["indexed_count"], 3);

    let files: Vec<String> = client
        .get(format!("{base}/projects/{id}/files"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(files.len(), 3);

    let body = client
        .post(format!("{base}/projects/{id}/ask"))
        .json(&serde_json::json!({ "question": "Where is auth checked?" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(has_event(&body, "context"));
    assert!(body.contains("src/auth.rs"));
    assert!(has_event(&body, "delta"));
    assert!(has_event(&body, "done"));

    let deleted = client
        .delete(format!("{base}/projects/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);
    let missing = client
        .get(format!("{base}/projects/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(created["status"], "acquiring");
}

/// Deleting while an ingestion is running is refused, so no embeddings
/// are written for a project that no longer exists.
#[tokio::test]
async fn test_http_delete_during_ingest_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = FakeHost::with_archive(sample_archive());
    host.download_delay = Some(Duration::from_millis(300));
    let (base, vectors) = serve_app(dir.path(), host).await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{base}/projects"))
        .json(&serde_json::json!({ "url": "https://github.com/acme/demo" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    let project_id = Uuid::parse_str(&id).unwrap();

    let early = client
        .delete(format!("{base}/projects/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(early.status(), 409);

    wait_until_ready(&client, &base, &id).await;
    assert_eq!(vectors.count(project_id), 3);

    let deleted = client
        .delete(format!("{base}/projects/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);
    assert_eq!(vectors.count(project_id), 0);
    assert!(vectors.file_names(project_id).is_empty());
}

/// Serve the full router over fakes persisted under `data_dir`.
async fn serve_app(data_dir: &std::path::Path, host: FakeHost) -> (String, Arc<dyn VectorIndex>) {
    let mut config = test_config();
    config.data_dir = data_dir.to_path_buf();

    let host: Arc<dyn SourceHost> = Arc::new(host);
    let vectors: Arc<dyn VectorIndex> =
        Arc::new(InMemoryVectorIndex::open_or_create(&config.vector_dir()).unwrap());
    let commits: Arc<dyn CommitStore> =
        Arc::new(InMemoryCommitStore::open_or_create(&config.commit_dir()).unwrap());
    let pipeline = Pipeline::new(
        &config,
        providers(default_model()),
        host,
        vectors.clone(),
        commits.clone(),
        Arc::new(RecordingClock::default()),
    );
    let state = AppState::from_parts(config, Vec::new(), pipeline, vectors.clone(), commits);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, repo_qa::api::router(state)).await.unwrap();
    });
    (format!("http://{addr}/api"), vectors)
}

async fn wait_until_ready(client: &reqwest::Client, base: &str, id: &str) -> serde_json::Value {
    for _ in 0..100 {
        let project: serde_json::Value = client
            .get(format!("{base}/projects/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if project["status"] == "ready" {
            return project;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("project {id} never became ready");
}

fn has_event(body: &str, name: &str) -> bool {
    body.lines()
        .any(|line| line.strip_prefix("event:").map(str::trim) == Some(name))
}
