use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FileEmbedding, RetrievalHit};
use crate::store::{load_json, write_json_atomic};

/// Per-project file embeddings, unique by `(project_id, file_name)`.
pub trait VectorIndex: Send + Sync {
    /// Insert, or replace summary/source/vector of the existing record.
    fn upsert(&self, record: FileEmbedding) -> Result<()> {
        self.upsert_many(vec![record])
    }

    fn upsert_many(&self, records: Vec<FileEmbedding>) -> Result<()>;

    /// Records scoring strictly above `floor`, best first, at most `top_k`.
    fn search(&self, project_id: Uuid, query: &[f32], floor: f32, top_k: usize)
        -> Vec<RetrievalHit>;

    /// Exact-name lookups, in the order of `names`. Similarity is left at 0.
    fn find_by_names(&self, project_id: Uuid, names: &[&str]) -> Vec<RetrievalHit>;

    /// The first `n` records in insertion order. Similarity is left at 0.
    fn first_n(&self, project_id: Uuid, n: usize) -> Vec<RetrievalHit>;

    fn file_names(&self, project_id: Uuid) -> Vec<String>;

    fn count(&self, project_id: Uuid) -> usize;

    /// Returns the number of records removed.
    fn delete_project(&self, project_id: Uuid) -> Result<usize>;
}

/// In-memory vector index with optional disk persistence.
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<FileEmbedding>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryVectorIndex {
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    pub fn open_or_create(vector_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join("vectors.json");
        let entries = load_json(&persist_path)?;
        Ok(Self {
            entries: RwLock::new(entries),
            persist_path: Some(persist_path),
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    fn persist(&self, entries: &[FileEmbedding]) -> Result<()> {
        match &self.persist_path {
            Some(path) => write_json_atomic(path, entries),
            None => Ok(()),
        }
    }
}

fn to_hit(e: &FileEmbedding, similarity: f32) -> RetrievalHit {
    RetrievalHit {
        file_name: e.file_name.clone(),
        source_code: e.source_code.clone(),
        summary: e.summary.clone(),
        similarity,
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert_many(&self, records: Vec<FileEmbedding>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        // Held for the whole batch so no reader sees a half-applied key
        let mut entries = self.entries.write();
        // Applied to a copy so a failed write leaves the served index unchanged
        let mut next = entries.clone();
        for record in records {
            let existing = next
                .iter_mut()
                .find(|e| e.project_id == record.project_id && e.file_name == record.file_name);
            match existing {
                Some(e) => {
                    e.summary = record.summary;
                    e.source_code = record.source_code;
                    e.vector = record.vector;
                }
                None => next.push(record),
            }
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn search(
        &self,
        project_id: Uuid,
        query: &[f32],
        floor: f32,
        top_k: usize,
    ) -> Vec<RetrievalHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &FileEmbedding)> = entries
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| (cosine_similarity(query, &e.vector), e))
            .filter(|(score, _)| *score > floor)
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored.into_iter().map(|(score, e)| to_hit(e, score)).collect()
    }

    fn find_by_names(&self, project_id: Uuid, names: &[&str]) -> Vec<RetrievalHit> {
        let entries = self.entries.read();
        names
            .iter()
            .filter_map(|name| {
                entries
                    .iter()
                    .find(|e| e.project_id == project_id && e.file_name == *name)
            })
            .map(|e| to_hit(e, 0.0))
            .collect()
    }

    fn first_n(&self, project_id: Uuid, n: usize) -> Vec<RetrievalHit> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.project_id == project_id)
            .take(n)
            .map(|e| to_hit(e, 0.0))
            .collect()
    }

    fn file_names(&self, project_id: Uuid) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| e.file_name.clone())
            .collect()
    }

    fn count(&self, project_id: Uuid) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.project_id == project_id)
            .count()
    }

    fn delete_project(&self, project_id: Uuid) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.project_id != project_id);
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }
}

/// Cosine similarity; 0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
