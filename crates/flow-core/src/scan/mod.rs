//! Repository inspection: clone a remote repository into a temp dir and walk
//! its sources for counts, heuristic security findings and a structural survey.
//!
//! All walkers skip hidden entries and the usual vendored/build directories.
//! Counts are regex-based and approximate.

pub mod clone;
pub mod metrics;
pub mod security;
pub mod survey;

pub use clone::{clone_repository, ClonedRepo};
pub use metrics::CodeMetrics;
pub use security::{SecurityFinding, SecurityScan};
pub use survey::RepoSurvey;

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", "__pycache__", "venv", "env", "dist", "build"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Python,
    Script,
    Other,
}

impl SourceKind {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("py") => SourceKind::Python,
            Some("js" | "jsx" | "ts" | "tsx") => SourceKind::Script,
            _ => SourceKind::Other,
        }
    }
}

/// Every non-hidden file under `root`, sorted, excluding [`EXCLUDED_DIRS`].
pub(crate) fn source_files(root: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_exclude(false)
        .git_global(false)
        .ignore(false)
        .parents(false)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && EXCLUDED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    let mut files: Vec<PathBuf> = walker
        .flatten()
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// `path` relative to `root`, with forward slashes.
pub(crate) fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
