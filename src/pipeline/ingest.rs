use futures_util::stream::{self, StreamExt};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::llm::embeddings::fit_dimension;
use crate::llm::provider::{Embedder, ProviderChain};
use crate::llm::summarize::Summarizer;
use crate::models::{FileEmbedding, SourceFile};

/// Per-file outcome of one generation run.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub records: Vec<FileEmbedding>,
    /// Paths that could not be summarized or embedded, with the cause
    pub failures: Vec<(String, Error)>,
}

impl GenerationReport {
    pub fn attempted(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

/// Summarizes files and embeds the summaries with bounded concurrency.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    summarizer: Summarizer,
    embedder: ProviderChain<dyn Embedder>,
    dimension: usize,
    concurrency: usize,
}

impl EmbeddingGenerator {
    pub fn new(
        summarizer: Summarizer,
        embedder: ProviderChain<dyn Embedder>,
        dimension: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            summarizer,
            embedder,
            dimension,
            concurrency: concurrency.max(1),
        }
    }

    /// One record per file that made it through both model calls. Results
    /// arrive in completion order, not input order.
    pub async fn generate(&self, project_id: Uuid, files: Vec<SourceFile>) -> GenerationReport {
        let total = files.len();
        let outcomes: Vec<(String, Result<FileEmbedding>)> = stream::iter(files)
            .map(|file| async move {
                let path = file.path.clone();
                let outcome = self.embed_file(project_id, file).await;
                (path, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = GenerationReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping {path}: {e}");
                    report.failures.push((path, e));
                }
            }
        }

        tracing::info!(
            "Generated {} of {total} embeddings ({} failed)",
            report.records.len(),
            report.failures.len()
        );
        report
    }

    async fn embed_file(&self, project_id: Uuid, file: SourceFile) -> Result<FileEmbedding> {
        let summary = self
            .summarizer
            .summarize_file(&file.path, &file.content)
            .await?;
        let vector = self.embedder.embed(&summary).await?;
        Ok(FileEmbedding {
            project_id,
            file_name: file.path,
            source_code: file.content,
            summary,
            vector: fit_dimension(vector, self.dimension),
        })
    }
}
