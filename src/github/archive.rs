use std::io::{Cursor, Read};

use crate::error::Result;
use crate::github::filter::{strip_archive_prefix, FileFilter, RawEntry};
use crate::models::SourceFile;

#[derive(Debug, Clone, Copy)]
pub struct UnpackLimits {
    pub max_files: usize,
    pub chunk_size: usize,
}

/// Extract indexable files from an in-memory zip archive.
///
/// Entries are visited by index, a chunk at a time, and only entries whose
/// path passes the filter are decompressed. Stops once `max_files` files
/// have been kept.
pub fn unpack(bytes: &[u8], filter: &FileFilter, limits: UnpackLimits) -> Result<Vec<SourceFile>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let total = archive.len();
    let chunk_size = limits.chunk_size.max(1);
    let mut files = Vec::new();

    'chunks: for start in (0..total).step_by(chunk_size) {
        let end = (start + chunk_size).min(total);
        let before = files.len();

        for i in start..end {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let path = strip_archive_prefix(entry.name()).to_string();
            if !filter.path_is_candidate(&path) {
                continue;
            }

            let max_bytes = filter.max_entry_bytes();
            if entry.size() > max_bytes {
                tracing::debug!("Skipping oversized archive entry {path}");
                continue;
            }
            // Declared sizes can lie, so the read itself is bounded too
            let mut buf = Vec::with_capacity(entry.size().min(1 << 20) as usize);
            if let Err(e) = (&mut entry).take(max_bytes + 1).read_to_end(&mut buf) {
                tracing::warn!("Skipping unreadable archive entry {path}: {e}");
                continue;
            }
            if buf.len() as u64 > max_bytes {
                tracing::debug!("Skipping oversized archive entry {path}");
                continue;
            }

            if let Some(file) = filter.normalize(RawEntry {
                path,
                is_dir: false,
                bytes: buf,
            }) {
                files.push(file);
                if files.len() >= limits.max_files {
                    tracing::info!("Reached file cap of {}, stopping unpack", limits.max_files);
                    break 'chunks;
                }
            }
        }

        tracing::debug!(
            "Unpacked entries {start}..{end} of {total}: kept {}",
            files.len() - before
        );
    }

    Ok(files)
}
