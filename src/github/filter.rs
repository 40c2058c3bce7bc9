//! Archive entry filtering.
//!
//! Matching is by path segment, exact name or suffix only. Output order is
//! input order, so filtering the same archive twice gives the same files.

use crate::models::SourceFile;

/// Directory names that are never descended into.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    "target",
    ".next",
    ".vercel",
    "coverage",
    "tmp",
    ".idea",
    ".vscode",
    "__pycache__",
    "vendor",
    ".venv",
    "venv",
];

/// Exact file names that are always skipped (lockfiles, OS artifacts).
const IGNORED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "poetry.lock",
    "composer.lock",
    "Gemfile.lock",
    ".DS_Store",
    "Thumbs.db",
];

const IGNORED_SUFFIXES: &[&str] = &[".log", ".tmp", ".swp", ".swo"];

/// Extensionless files worth indexing.
const KNOWN_NAMES: &[&str] = &["Dockerfile", "Makefile", "Justfile", "Procfile"];

/// Raw archive entry before normalization.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub path: String,
    pub is_dir: bool,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct FileFilter {
    max_file_chars: usize,
}

impl FileFilter {
    pub fn new(max_file_chars: usize) -> Self {
        Self { max_file_chars }
    }

    /// Upper bound on the decompressed bytes of a file that can still pass
    /// the character cap. UTF-8 needs at most four bytes per char.
    pub fn max_entry_bytes(&self) -> u64 {
        (self.max_file_chars as u64).saturating_mul(4)
    }

    /// Path-only checks, applied before an entry is decompressed.
    pub fn path_is_candidate(&self, path: &str) -> bool {
        if path.is_empty() || path.ends_with('/') {
            return false;
        }
        !is_ignored(path) && is_indexable(path)
    }

    /// Full check of one entry. Returns `None` for anything that must not be
    /// indexed: directories, ignored or unknown paths, undecodable, empty
    /// or oversized content.
    pub fn normalize(&self, entry: RawEntry) -> Option<SourceFile> {
        if entry.is_dir {
            return None;
        }
        let path = entry.path.replace('\\', "/");
        if !self.path_is_candidate(&path) {
            return None;
        }
        let content = String::from_utf8(entry.bytes).ok()?;
        if content.is_empty() || content.contains('\0') {
            return None;
        }
        // Byte length bounds char count from above
        if content.len() > self.max_file_chars && content.chars().count() > self.max_file_chars {
            return None;
        }
        Some(SourceFile { path, content })
    }
}

/// Drop the synthetic `{repo}-{branch}/` directory archives are wrapped in.
pub fn strip_archive_prefix(name: &str) -> &str {
    name.split_once('/').map(|(_, rest)| rest).unwrap_or("")
}

fn is_ignored(path: &str) -> bool {
    let mut segments: Vec<&str> = path.split('/').collect();
    let file_name = segments.pop().unwrap_or_default();

    if segments.iter().any(|dir| IGNORED_DIRS.contains(dir)) {
        return true;
    }
    if IGNORED_FILES.contains(&file_name) {
        return true;
    }
    if file_name == ".env" || file_name.starts_with(".env.") {
        return true;
    }
    IGNORED_SUFFIXES.iter().any(|s| file_name.ends_with(s))
}

fn is_indexable(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if KNOWN_NAMES.contains(&file_name) {
        return true;
    }
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        // Source
        "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx"
            | "py" | "java" | "kt" | "scala" | "c" | "h" | "cpp" | "hpp" | "cs"
            | "go" | "rs" | "php" | "rb" | "swift" | "dart" | "lua" | "ex" | "exs"
            | "sh" | "bat" | "ps1" | "sql"
            // Web
            | "html" | "css" | "scss" | "sass" | "less" | "vue" | "svelte" | "astro"
            // Config
            | "json" | "xml" | "yaml" | "yml" | "toml" | "ini" | "graphql" | "proto"
            // Docs
            | "md" | "mdx" | "txt"
    )
}
