//! The seven workflow agents.
//!
//! Every agent implements [`StepHandler`]: it takes the step's [`StepContext`]
//! and produces an [`AgentOutput`]. Agents share one [`Services`] bundle
//! (LLM, artifact registry, architecture cache, output directory).

pub mod architecture;
pub mod coding;
pub mod impact;
pub mod review;
pub mod security;
pub mod testing;
pub mod uiux;

pub use architecture::ArchitectureAgent;
pub use coding::CodingAgent;
pub use impact::ImpactAgent;
pub use review::CodeReviewAgent;
pub use security::SecurityAgent;
pub use testing::TestingAgent;
pub use uiux::UiUxAgent;

use async_trait::async_trait;
use llm_gateway::TextGenerator;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::ArtifactRegistry;
use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::error::{FlowError, Result};
use crate::io::atomic_write;
use crate::paths;
use crate::scan::{clone_repository, ClonedRepo};
use crate::types::{AgentOutput, StepContext, WorkflowStep};

/// One step of the workflow.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput>;
}

/// Dispatch table from step to handler.
pub type HandlerTable = HashMap<WorkflowStep, Arc<dyn StepHandler>>;

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Collaborators shared by every agent.
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn TextGenerator>,
    pub registry: Arc<ArtifactRegistry>,
    pub cache: Arc<AnalysisCache>,
    pub output_dir: PathBuf,
    pub clone_timeout: Duration,
}

impl Services {
    pub fn new(llm: Arc<dyn TextGenerator>, registry: Arc<ArtifactRegistry>, config: &Config) -> Self {
        Self {
            llm,
            registry,
            cache: Arc::new(AnalysisCache::new(config.cache.architecture_capacity)),
            output_dir: config.output_dir(),
            clone_timeout: config.clone_timeout(),
        }
    }

    pub(crate) async fn ask(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        Ok(self.llm.generate(system_prompt, user_prompt).await?)
    }

    pub(crate) async fn checkout(&self, url: &str) -> Result<ClonedRepo> {
        clone_repository(url, self.clone_timeout).await
    }

    /// Write `bytes` to `{output_dir}/{prefix}_{id}.{ext}` under a fresh id
    /// and register it for download.
    pub(crate) fn save_report(&self, prefix: &str, ext: &str, bytes: &[u8]) -> Result<String> {
        let artifact = self
            .registry
            .register_new(|id| paths::report_path(&self.output_dir, prefix, id, ext));
        atomic_write(&artifact.path, bytes)?;
        Ok(artifact.id)
    }

    /// Render `markdown` to PDF off the async runtime and save it as a report.
    pub(crate) async fn save_pdf(&self, prefix: &str, markdown: &str) -> Result<String> {
        let markdown = markdown.to_string();
        let bytes = blocking(move || crate::render::render_pdf(&markdown)).await??;
        self.save_report(prefix, "pdf", &bytes)
    }

    /// A fresh directory `{output_dir}/{prefix}_{unix_ts}_{suffix}`.
    pub(crate) fn fresh_dir(&self, prefix: &str) -> Result<PathBuf> {
        let dir = self.output_dir.join(paths::unique_name(prefix));
        crate::io::ensure_dir(&dir)?;
        Ok(dir)
    }
}

/// Run CPU- or filesystem-bound work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FlowError::Io(std::io::Error::other(e)))
}

/// The standard handler for every step.
pub fn default_handlers(services: &Services) -> HandlerTable {
    let mut table: HandlerTable = HashMap::new();
    table.insert(WorkflowStep::UiUx, Arc::new(UiUxAgent::new(services.clone())));
    table.insert(
        WorkflowStep::Architecture,
        Arc::new(ArchitectureAgent::new(services.clone())),
    );
    table.insert(
        WorkflowStep::ImpactAnalysis,
        Arc::new(ImpactAgent::new(services.clone())),
    );
    table.insert(WorkflowStep::Coding, Arc::new(CodingAgent::new(services.clone())));
    table.insert(WorkflowStep::Testing, Arc::new(TestingAgent::new(services.clone())));
    table.insert(
        WorkflowStep::SecurityScanning,
        Arc::new(SecurityAgent::new(services.clone())),
    );
    table.insert(
        WorkflowStep::CodeReview,
        Arc::new(CodeReviewAgent::new(services.clone())),
    );
    table
}

// ---------------------------------------------------------------------------
// Shared text helpers
// ---------------------------------------------------------------------------

/// Rules for picking requirement-like lines out of free text.
pub(crate) struct LineFilter<'a> {
    pub keywords: &'a [&'a str],
    /// Characters trimmed from the start of a matching line.
    pub bullets: &'a [char],
    /// Exclusive bounds on the cleaned line's length in characters.
    pub min_len: usize,
    pub max_len: usize,
}

impl LineFilter<'_> {
    /// Lines containing a keyword (case-insensitive), bullet-stripped and
    /// length-filtered, in order of appearance.
    pub fn extract(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                self.keywords.iter().any(|k| lower.contains(k))
            })
            .map(|line| line.trim().trim_start_matches(self.bullets).trim().to_string())
            .filter(|line| {
                let n = line.chars().count();
                n > self.min_len && n < self.max_len
            })
            .collect()
    }
}

/// Leading `n` characters of `text`.
pub(crate) fn truncate(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// File name of `path` for display.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services_in, CannedLlm};

    #[test]
    fn line_filter_strips_bullets_and_bounds_length() {
        let filter = LineFilter {
            keywords: &["feature"],
            bullets: &['-', '*', '#', ' '],
            min_len: 8,
            max_len: 40,
        };
        let text = "# Features\n- Feature: user login\n* feature x\nno match here\n- a feature line that is far too long to be kept around";
        assert_eq!(
            filter.extract(text),
            vec!["Feature: user login".to_string(), "feature x".to_string()]
        );
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ab", 10), "ab");
    }

    #[test]
    fn default_table_covers_every_step() {
        let dir = tempfile::TempDir::new().unwrap();
        let services = services_in(dir.path(), CannedLlm::new("ok"));
        let table = default_handlers(&services);
        for step in WorkflowStep::all() {
            assert!(table.contains_key(step), "missing handler for {step}");
        }
    }

    #[tokio::test]
    async fn save_report_registers_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let services = services_in(dir.path(), CannedLlm::new("ok"));
        let id = services.save_report("impact_analysis", "md", b"# Report").unwrap();
        let path = services.registry.resolve(&id).unwrap();
        assert_eq!(display_name(&path), format!("impact_analysis_{id}.md"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# Report");

        assert!(uuid::Uuid::parse_str(&id).is_ok());
        let other = services.save_report("impact_analysis", "md", b"# Again").unwrap();
        assert_ne!(id, other);
        assert_eq!(services.registry.len(), 2);
    }

    #[tokio::test]
    async fn save_pdf_writes_pdf_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let services = services_in(dir.path(), CannedLlm::new("ok"));
        let id = services.save_pdf("testing_report", "# Title\n\nBody").await.unwrap();
        let bytes = std::fs::read(services.registry.resolve(&id).unwrap()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
