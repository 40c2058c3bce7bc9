//! Keyed stores for file embeddings and commit records.
//!
//! Both ship as in-memory implementations that optionally persist to a JSON
//! file rewritten on every change.

pub mod commits;
pub mod vector;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use commits::{CommitStore, InMemoryCommitStore};
pub use vector::{InMemoryVectorIndex, VectorIndex};

/// Load a JSON array, treating a missing file as empty.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    match serde_json::from_str(&data) {
        Ok(items) => Ok(items),
        Err(e) => {
            tracing::warn!("Ignoring unreadable store {}: {e}", path.display());
            Ok(Vec::new())
        }
    }
}

/// Atomic write via temp file + rename.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
