use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::models::CommitRecord;
use crate::store::{load_json, write_json_atomic};

/// Summarized commits, unique by `(project_id, commit_hash)`.
pub trait CommitStore: Send + Sync {
    fn hashes(&self, project_id: Uuid) -> HashSet<String>;

    /// Returns `false` without writing when the hash is already recorded.
    fn insert(&self, record: CommitRecord) -> Result<bool>;

    /// Records in insertion order.
    fn list(&self, project_id: Uuid) -> Vec<CommitRecord>;

    fn delete_project(&self, project_id: Uuid) -> Result<usize>;
}

pub struct InMemoryCommitStore {
    records: RwLock<Vec<CommitRecord>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryCommitStore {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    pub fn open_or_create(commit_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(commit_dir)?;
        let persist_path = commit_dir.join("commits.json");
        let records = load_json(&persist_path)?;
        Ok(Self {
            records: RwLock::new(records),
            persist_path: Some(persist_path),
        })
    }

    fn persist(&self, records: &[CommitRecord]) -> Result<()> {
        match &self.persist_path {
            Some(path) => write_json_atomic(path, records),
            None => Ok(()),
        }
    }
}

impl CommitStore for InMemoryCommitStore {
    fn hashes(&self, project_id: Uuid) -> HashSet<String> {
        self.records
            .read()
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.commit_hash.clone())
            .collect()
    }

    fn insert(&self, record: CommitRecord) -> Result<bool> {
        let mut records = self.records.write();
        let duplicate = records
            .iter()
            .any(|r| r.project_id == record.project_id && r.commit_hash == record.commit_hash);
        if duplicate {
            return Ok(false);
        }
        records.push(record);
        self.persist(&records)?;
        Ok(true)
    }

    fn list(&self, project_id: Uuid) -> Vec<CommitRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect()
    }

    fn delete_project(&self, project_id: Uuid) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.project_id != project_id);
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records)?;
        }
        Ok(removed)
    }
}
