//! End-to-end operations: ingest a repository, answer a question about it,
//! and poll its recent commits.

pub mod answer;
pub mod commits;
pub mod ingest;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::{Config, LlmConfig};
use crate::error::{Error, Result};
use crate::github::{Acquirer, Clock, SourceHost};
use crate::llm::embeddings::fit_dimension;
use crate::llm::{prompts, Embedder, ModelClient, ProviderChain, StreamingGenerator, Summarizer, TextGenerator};
use crate::models::{CommitRecord, FileCount, IngestReport, RepositoryReference};
use crate::search::{ContextAssembler, QuestionClassifier};
use crate::store::{CommitStore, VectorIndex};

pub use answer::{Answer, AnswerChunk, AnswerStream, AnswerStreamer};
pub use commits::CommitPoller;
pub use ingest::{EmbeddingGenerator, GenerationReport};

/// One chain per model capability.
#[derive(Clone)]
pub struct Providers {
    pub text: ProviderChain<dyn TextGenerator>,
    pub streaming: ProviderChain<dyn StreamingGenerator>,
    pub embedding: ProviderChain<dyn Embedder>,
}

impl Providers {
    /// Primary first, then the optional fallback, for every capability.
    pub fn from_config(http: &reqwest::Client, config: &LlmConfig) -> Result<Self> {
        let mut clients = vec![Arc::new(ModelClient::new(http.clone(), config.primary.clone())?)];
        if let Some(fallback) = &config.fallback {
            clients.push(Arc::new(ModelClient::new(http.clone(), fallback.clone())?));
        }
        for client in &clients {
            tracing::info!("Model provider: {}", client.name);
        }

        let text: Vec<Arc<dyn TextGenerator>> = clients
            .iter()
            .map(|c| c.clone() as Arc<dyn TextGenerator>)
            .collect();
        let streaming: Vec<Arc<dyn StreamingGenerator>> = clients
            .iter()
            .map(|c| c.clone() as Arc<dyn StreamingGenerator>)
            .collect();
        let embedding: Vec<Arc<dyn Embedder>> = clients
            .into_iter()
            .map(|c| c as Arc<dyn Embedder>)
            .collect();

        Ok(Self {
            text: ProviderChain::new("completion", text),
            streaming: ProviderChain::new("streaming", streaming),
            embedding: ProviderChain::new("embedding", embedding),
        })
    }
}

/// Progress notifications from [`Pipeline::ingest_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Files are acquired and summarization is starting
    Embedding { files: usize, file_count: FileCount },
}

pub struct Pipeline {
    acquirer: Acquirer,
    generator: EmbeddingGenerator,
    classifier: QuestionClassifier,
    assembler: ContextAssembler,
    streamer: AnswerStreamer,
    poller: CommitPoller,
    embedder: ProviderChain<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    dimension: usize,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        providers: Providers,
        host: Arc<dyn SourceHost>,
        index: Arc<dyn VectorIndex>,
        commits: Arc<dyn CommitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let summarizer = Summarizer::new(providers.text.clone(), config.ingest.summary_input_chars);
        Self {
            acquirer: Acquirer::new(host.clone(), &config.github),
            generator: EmbeddingGenerator::new(
                summarizer.clone(),
                providers.embedding.clone(),
                config.ingest.embedding_dim,
                config.ingest.concurrency,
            ),
            classifier: QuestionClassifier::new(providers.text.clone()),
            assembler: ContextAssembler::new(index.clone(), config.retrieval.clone()),
            streamer: AnswerStreamer::new(
                providers.streaming,
                providers.text,
                Duration::from_secs(config.llm.stream_idle_timeout_secs),
            ),
            poller: CommitPoller::new(host, commits, summarizer, clock, config.commits.clone()),
            embedder: providers.embedding,
            index,
            dimension: config.ingest.embedding_dim,
        }
    }

    pub async fn ingest(
        &self,
        project_id: Uuid,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Result<IngestReport> {
        self.ingest_with(project_id, reference, credential, |_| {}).await
    }

    /// Acquire, summarize, embed and upsert. Re-ingesting the same
    /// repository replaces records in place.
    pub async fn ingest_with<F>(
        &self,
        project_id: Uuid,
        reference: &RepositoryReference,
        credential: Option<&str>,
        on_stage: F,
    ) -> Result<IngestReport>
    where
        F: Fn(IngestStage) + Send + Sync,
    {
        let acquisition = self.acquirer.acquire(reference, credential).await?;
        if acquisition.files.is_empty() {
            return Err(Error::EmptyRepository);
        }
        let file_count = acquisition.file_count;
        let resolved = acquisition.reference.clone();
        tracing::info!(
            "Acquired {} files from {}@{}",
            acquisition.files.len(),
            acquisition.reference,
            acquisition.reference.branch
        );
        on_stage(IngestStage::Embedding {
            files: acquisition.files.len(),
            file_count,
        });

        let report = self.generator.generate(project_id, acquisition.files).await;
        let attempted = report.attempted();
        let failed_count = report.failures.len();
        let indexed_count = report.records.len();
        if indexed_count == 0 {
            return Err(Error::NothingIndexed { attempted });
        }

        self.index.upsert_many(report.records)?;
        tracing::info!("Indexed {indexed_count}/{attempted} files for {reference}");
        Ok(IngestReport {
            reference: resolved,
            file_count,
            indexed_count,
            failed_count,
        })
    }

    /// Classify, retrieve and start streaming. Classification and question
    /// embedding degrade instead of failing, so this always yields a stream.
    pub async fn ask(&self, project_id: Uuid, question: &str) -> Answer {
        let (kind, query) = tokio::join!(
            self.classifier.classify(question),
            self.embed_question(question)
        );
        let context = self.assembler.assemble(project_id, query.as_deref(), kind);
        tracing::info!(
            "Answering {kind:?} question with {} context files",
            context.hits.len()
        );

        let prompt = prompts::answer(&context.text, question);
        Answer {
            stream: self.streamer.stream(prompt),
            references: context.hits,
            kind,
        }
    }

    async fn embed_question(&self, question: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(question).await {
            Ok(vector) => Some(fit_dimension(vector, self.dimension)),
            Err(e) => {
                tracing::warn!("Question embedding failed, retrieving without search: {e}");
                None
            }
        }
    }

    pub async fn poll_commits(
        &self,
        project_id: Uuid,
        reference: &RepositoryReference,
        credential: Option<&str>,
    ) -> Result<Vec<CommitRecord>> {
        self.poller.poll(project_id, reference, credential).await
    }
}
