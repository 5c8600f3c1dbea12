use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::debug;

use crate::error::{FlowError, Result};

/// A generated report file addressable by an opaque id.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Process-lifetime map from artifact id to file on disk.
///
/// Registration never checks the filesystem; `resolve` does, so a file deleted
/// behind the registry's back reads as not found.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    entries: RwLock<HashMap<String, Artifact>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `id -> path`. Re-registering an id replaces the earlier path.
    pub fn register(&self, id: impl Into<String>, path: impl Into<PathBuf>) -> Artifact {
        let artifact = Artifact {
            id: id.into(),
            path: path.into(),
            created_at: Utc::now(),
        };
        debug!(id = %artifact.id, path = %artifact.path.display(), "artifact registered");
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(artifact.id.clone(), artifact.clone());
        artifact
    }

    /// Register under a fresh UUID v4, building the path from the new id.
    pub fn register_new(&self, path_for: impl FnOnce(&str) -> PathBuf) -> Artifact {
        let id = uuid::Uuid::new_v4().to_string();
        let path = path_for(&id);
        self.register(id, path)
    }

    /// The path for `id`, provided the file still exists.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(id) {
            Some(a) if a.path.is_file() => Ok(a.path.clone()),
            _ => Err(FlowError::ArtifactNotFound(id.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> Option<Artifact> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn register_then_resolve() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let reg = ArtifactRegistry::new();
        reg.register("abc", &path);
        assert_eq!(reg.resolve("abc").unwrap(), path);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let reg = ArtifactRegistry::new();
        assert!(matches!(
            reg.resolve("nope"),
            Err(FlowError::ArtifactNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn deleted_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.md");
        std::fs::write(&path, b"x").unwrap();

        let reg = ArtifactRegistry::new();
        reg.register("gone", &path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(reg.resolve("gone"), Err(FlowError::ArtifactNotFound(_))));
        assert!(reg.get("gone").is_some());
    }

    #[test]
    fn last_registration_wins() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.md");
        let second = dir.path().join("b.md");
        std::fs::write(&first, b"a").unwrap();
        std::fs::write(&second, b"b").unwrap();

        let reg = ArtifactRegistry::new();
        reg.register("id", &first);
        reg.register("id", &second);
        assert_eq!(reg.resolve("id").unwrap(), second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn register_new_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let reg = ArtifactRegistry::new();
        let a = reg.register_new(|id| dir.path().join(format!("r_{id}.md")));
        let b = reg.register_new(|id| dir.path().join(format!("r_{id}.md")));
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
        assert_eq!(a.path, dir.path().join(format!("r_{}.md", a.id)));
    }
}
