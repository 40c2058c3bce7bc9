use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::llm::prompts::{sanitize_for_prompt, truncate_chars};
use crate::models::{QuestionKind, RetrievalHit};
use crate::store::VectorIndex;

/// High-signal files added for broad questions, in priority order.
pub const ANCHOR_FILES: &[&str] = &[
    "README.md",
    "package.json",
    "Cargo.toml",
    "src/app/page.tsx",
    "index.ts",
    "main.ts",
    "src/index.ts",
    "src/main.rs",
    "src/lib.rs",
    "app.py",
    "main.py",
    "requirements.txt",
    "go.mod",
];

/// Anchors are curated rather than retrieved, so they rank as exact matches.
pub const ANCHOR_SIMILARITY: f32 = 1.0;
pub const FALLBACK_SIMILARITY: f32 = 0.5;

const TRUNCATED: &str = "...(truncated)";

/// Files chosen for a question and the prompt text built from them.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Files included in `text`, in rank order
    pub hits: Vec<RetrievalHit>,
    pub text: String,
}

#[derive(Clone)]
pub struct ContextAssembler {
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl ContextAssembler {
    pub fn new(index: Arc<dyn VectorIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    /// Primary search, then anchors and the insertion-order fallback for
    /// broad questions. `query` is `None` when the question could not be
    /// embedded.
    pub fn select(
        &self,
        project_id: Uuid,
        query: Option<&[f32]>,
        kind: QuestionKind,
    ) -> Vec<RetrievalHit> {
        let mut hits = match query {
            Some(q) => self.index.search(
                project_id,
                q,
                self.config.similarity_floor,
                self.config.top_k,
            ),
            None => Vec::new(),
        };
        let primary_empty = hits.is_empty();

        if kind == QuestionKind::Broad {
            let seen: HashSet<&str> = hits.iter().map(|h| h.file_name.as_str()).collect();
            let wanted: Vec<&str> = ANCHOR_FILES
                .iter()
                .copied()
                .filter(|name| !seen.contains(name))
                .collect();
            let anchors = self
                .index
                .find_by_names(project_id, &wanted)
                .into_iter()
                .take(self.config.anchor_limit)
                .map(|h| with_similarity(h, ANCHOR_SIMILARITY));
            hits.extend(anchors);

            if primary_empty {
                tracing::info!("No hits above the floor for a broad question, using first indexed files");
                let fallback = self
                    .index
                    .first_n(project_id, self.config.fallback_files)
                    .into_iter()
                    .map(|h| with_similarity(h, FALLBACK_SIMILARITY));
                hits.extend(fallback);
            }
        }

        dedup_by_name(hits)
    }

    pub fn assemble(
        &self,
        project_id: Uuid,
        query: Option<&[f32]>,
        kind: QuestionKind,
    ) -> AssembledContext {
        let hits = self.select(project_id, query, kind);
        let file_names = self.index.file_names(project_id);
        render(hits, &file_names, &self.config)
    }
}

fn with_similarity(mut hit: RetrievalHit, similarity: f32) -> RetrievalHit {
    hit.similarity = similarity;
    hit
}

/// Keep the first occurrence of every file name.
pub fn dedup_by_name(hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.file_name.clone()))
        .collect()
}

/// File listing joined by newlines, cut at `max_chars` characters.
pub fn render_listing(file_names: &[String], max_chars: usize) -> String {
    let listing = file_names.join("\n");
    if listing.chars().count() <= max_chars {
        return listing;
    }
    format!("{}\n{TRUNCATED}", truncate_chars(&listing, max_chars))
}

/// Serialize hits under the directory listing. Each file's source is capped,
/// and files stop being added once the total budget is spent.
pub fn render(
    hits: Vec<RetrievalHit>,
    file_names: &[String],
    config: &RetrievalConfig,
) -> AssembledContext {
    let mut text = String::from("PROJECT FILE STRUCTURE:\n");
    text.push_str(&render_listing(file_names, config.max_listing_chars));
    text.push_str("\n\n");

    let mut included = Vec::with_capacity(hits.len());
    for hit in hits {
        let code = truncate_chars(&hit.source_code, config.max_file_context_chars);
        let marker = if code.len() < hit.source_code.len() {
            format!("\n{TRUNCATED}")
        } else {
            String::new()
        };
        let mut block = String::new();
        let _ = write!(
            block,
            "source: {}\ncode content:\n{}{marker}\nsummary of file: {}\n\n",
            hit.file_name,
            sanitize_for_prompt(code),
            sanitize_for_prompt(&hit.summary)
        );

        if !included.is_empty() && text.len() + block.len() > config.max_context_chars {
            tracing::debug!("Context budget reached after {} files", included.len());
            break;
        }
        text.push_str(&block);
        included.push(hit);
    }

    if included.is_empty() {
        text.push_str("(No relevant files were found for this question.)\n\n");
    }

    AssembledContext {
        hits: included,
        text,
    }
}
