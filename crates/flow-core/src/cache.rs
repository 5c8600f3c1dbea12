use indexmap::IndexMap;
use std::sync::Mutex;

use crate::scan::RepoSurvey;

/// What the architecture step remembers about a repository between the
/// Markdown pass and the PDF pass.
#[derive(Debug, Clone)]
pub struct CachedAnalysis {
    pub survey: RepoSurvey,
    /// Structured outline built from the survey; the PDF renders this when present.
    pub outline: String,
    pub prd: String,
}

/// Bounded least-recently-used cache keyed by repository URL.
///
/// Entries are inserted at the back; hits move an entry to the back; the front
/// entry is evicted once `capacity` is exceeded. Last write wins.
#[derive(Debug)]
pub struct AnalysisCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, CachedAnalysis>>,
}

impl AnalysisCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedAnalysis> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let idx = entries.get_index_of(key)?;
        let last = entries.len() - 1;
        entries.move_index(idx, last);
        entries.get_index(last).map(|(_, v)| v.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: CachedAnalysis) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.shift_remove(&key);
        entries.insert(key, value);
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(32)
    }
}
