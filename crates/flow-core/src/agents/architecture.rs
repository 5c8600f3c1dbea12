use async_trait::async_trait;
use tracing::{info, warn};

use super::{blocking, truncate, Services, StepHandler};
use crate::cache::CachedAnalysis;
use crate::error::Result;
use crate::scan::RepoSurvey;
use crate::types::{AgentOutput, StepContext};

const ARCHITECT_PROMPT: &str = "You are Agent-2: Principal Software Architect.
Convert the JSON repository survey you are given into a professional Markdown
Application Architecture Document. Use only facts present in the survey.

STRUCTURE:
# System Architecture Document: <project name>
**Version:** 1.0.0
**Date:** <today>
**Repository:** <repository URL>

## 1. Executive Summary
## 2. High-Level Architecture
### 2.1 System Context Diagram (mermaid graph: User -> Frontend -> Backend -> Database)
### 2.2 Layered Architecture Diagram (mermaid graph: Presentation -> Business -> Data)
## 3. Endpoints Specification (total count, then 5-10 key endpoints)
## 4. Operational Workflows
## 5. Deployment & Security
## 6. Recommendations";

const FALLBACK_PROMPT: &str =
    "You are Agent-2: Principal Software Architect. Generate a System Architecture Document.";

/// How much of the PRD is embedded in the LLM request next to the survey.
const PRD_CHARS: usize = 4_000;

/// Step 2: survey the repository and write an architecture document.
pub struct ArchitectureAgent {
    services: Services,
}

impl ArchitectureAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Markdown architecture document for `prd`, grounded in the repository
    /// when one is given.
    ///
    /// A successful survey is cached under the repository URL for the PDF
    /// pass. If the survey fails the LLM summarises the PRD alone; if the LLM
    /// fails after a survey, a static document is built from the survey.
    pub async fn analyze(&self, prd: &str, repository: Option<&str>) -> Result<String> {
        let url = repository.unwrap_or_default();
        let survey = match repository {
            Some(url) => self.survey(url).await,
            None => None,
        };
        let Some(survey) = survey else {
            info!(repository = url, "no survey available, falling back to requirements-only analysis");
            let prompt = format!("Analyze these requirements:\n{prd}\n\nFor Repo: {url}");
            return self.services.ask(FALLBACK_PROMPT, &prompt).await;
        };

        let outline = survey.outline(prd);
        self.services.cache.insert(
            url,
            CachedAnalysis {
                survey: survey.clone(),
                outline,
                prd: prd.to_string(),
            },
        );

        let survey_json = serde_json::to_string_pretty(&survey)?;
        let mut prompt = format!(
            "Here is the System Architecture Analysis (JSON):\n{survey_json}\n\nGitHub URL: {url}"
        );
        if !prd.trim().is_empty() {
            prompt.push_str(&format!("\n\nRequirements:\n{}", truncate(prd, PRD_CHARS)));
        }

        match self.services.ask(ARCHITECT_PROMPT, &prompt).await {
            Ok(markdown) => Ok(markdown),
            Err(e) => {
                warn!(error = %e, "architecture LLM call failed, using static document");
                Ok(survey.static_markdown())
            }
        }
    }

    async fn survey(&self, url: &str) -> Option<RepoSurvey> {
        let repo = match self.services.checkout(url).await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "repository survey unavailable");
                return None;
            }
        };
        let url = url.to_string();
        match blocking(move || RepoSurvey::survey(repo.path(), &url)).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "repository survey task failed");
                None
            }
        }
    }

    /// Render the PDF report and register it. Uses the cached outline for
    /// `repository` when there is one, otherwise `markdown` itself.
    ///
    /// Returns `None` when rendering or writing fails.
    pub async fn report(&self, markdown: &str, repository: Option<&str>) -> Option<String> {
        let cached = repository.and_then(|url| self.services.cache.get(url));
        let source = match &cached {
            Some(c) => c.outline.as_str(),
            None => markdown,
        };
        match self.services.save_pdf("architecture_report", source).await {
            Ok(id) => {
                info!(file_id = %id, cached = cached.is_some(), "architecture report written");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "architecture PDF generation failed");
                None
            }
        }
    }
}

#[async_trait]
impl StepHandler for ArchitectureAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        let repository = ctx.repository();
        let markdown = self.analyze(&ctx.query, repository).await?;
        let file_id = self.report(&markdown, repository).await;
        Ok(AgentOutput {
            text: markdown,
            file_id,
            repository: repository.map(String::from),
            ..AgentOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services_with, CannedLlm};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn without_repository_summarises_requirements() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(CannedLlm::new("# System Architecture Document: Todo"));
        let agent = ArchitectureAgent::new(services_with(dir.path(), llm.clone()));

        let out = agent.produce(&StepContext::new("Todo app with tags")).await.unwrap();
        assert_eq!(out.text, "# System Architecture Document: Todo");
        assert!(out.repository.is_none());

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, FALLBACK_PROMPT);
        assert!(calls[0].1.starts_with("Analyze these requirements:\nTodo app with tags"));
    }

    #[tokio::test]
    async fn produces_registered_pdf_report() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(CannedLlm::new("# Architecture\n\n## Layers\n- API\n- DB"));
        let services = services_with(dir.path(), llm);
        let agent = ArchitectureAgent::new(services.clone());

        let out = agent.produce(&StepContext::new("prd")).await.unwrap();
        let id = out.file_id.expect("pdf registered");
        let path = services.registry.resolve(&id).unwrap();
        assert!(path.to_string_lossy().ends_with(&format!("architecture_report_{id}.pdf")));
    }

    #[tokio::test]
    async fn unreachable_repository_falls_back_to_llm() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(CannedLlm::new("fallback doc"));
        let services = services_with(dir.path(), llm.clone());
        let agent = ArchitectureAgent::new(services.clone());

        let missing = dir.path().join("no-such-repo");
        let url = missing.to_string_lossy().to_string();
        let ctx = StepContext::new("prd").with_repository(url.clone());
        let out = agent.produce(&ctx).await.unwrap();

        assert_eq!(out.text, "fallback doc");
        assert_eq!(out.repository.as_deref(), Some(url.as_str()));
        assert!(services.cache.is_empty());
        assert!(llm.calls()[0].1.ends_with(&format!("For Repo: {url}")));
    }

    #[tokio::test]
    async fn report_prefers_cached_outline() {
        let dir = TempDir::new().unwrap();
        let services = services_with(dir.path(), Arc::new(CannedLlm::new("x")));
        services.cache.insert(
            "https://github.com/a/b",
            CachedAnalysis {
                survey: RepoSurvey::default(),
                outline: "# Architecture Analysis: b".to_string(),
                prd: String::new(),
            },
        );
        let agent = ArchitectureAgent::new(services.clone());
        assert!(agent
            .report("# Doc", Some("https://github.com/a/b"))
            .await
            .is_some());
        assert_eq!(services.registry.len(), 1);
    }
}
