//! Runs one workflow step and turns the agent's output into an [`AgentResult`].
//!
//! The orchestrator holds no per-workflow state: the caller passes the
//! previous step's output back in as the next step's query.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{default_handlers, HandlerTable, Services};
use crate::artifact::ArtifactRegistry;
use crate::paths;
use crate::push::RepositoryHost;
use crate::types::{AgentOutput, AgentResult, Statistics, StepContext, WorkflowStep};

const REPO_DESCRIPTION: &str = "AI-Generated SDLC Project";

pub struct Orchestrator {
    handlers: HandlerTable,
    host: Arc<dyn RepositoryHost>,
    registry: Arc<ArtifactRegistry>,
}

impl Orchestrator {
    pub fn new(
        handlers: HandlerTable,
        host: Arc<dyn RepositoryHost>,
        registry: Arc<ArtifactRegistry>,
    ) -> Self {
        Self {
            handlers,
            host,
            registry,
        }
    }

    /// The seven standard agents over `services`.
    pub fn standard(services: &Services, host: Arc<dyn RepositoryHost>) -> Self {
        Self::new(default_handlers(services), host, services.registry.clone())
    }

    /// Forward a caller-supplied credential to the repository host.
    pub fn set_token(&self, token: &str) {
        let token = token.trim();
        if !token.is_empty() {
            self.host.set_token(token);
        }
    }

    /// Run step `step` against `ctx`. Never fails: problems are reported in
    /// the returned result.
    pub async fn run_step(&self, step: i64, ctx: StepContext) -> AgentResult {
        let Ok(step) = WorkflowStep::from_number(step) else {
            warn!(step, "rejected step number");
            return AgentResult::failure(None, "Invalid step number");
        };
        let n = step.number();
        let Some(handler) = self.handlers.get(&step) else {
            return AgentResult::failure(Some(step), format!("Step {n} failed: no handler registered"));
        };

        info!(step = n, agent = step.agent_name(), "running step");
        let output = match handler.produce(&ctx).await {
            Ok(o) => o,
            Err(e) => {
                warn!(step = n, error = %e, "step failed");
                return AgentResult::failure(Some(step), format!("Step {n} failed: {e}"));
            }
        };

        let result = self.publish(step, &ctx, output).await;
        info!(step = n, warnings = result.warnings.len(), "step complete");
        result
    }

    /// Apply the step's repository side effects and build the result message.
    async fn publish(&self, step: WorkflowStep, ctx: &StepContext, mut output: AgentOutput) -> AgentResult {
        let mut warnings = Vec::new();
        let mut pushed_files = None;
        let repository = ctx.repository().map(String::from);

        let message = match step {
            WorkflowStep::UiUx => {
                let repo_msg = match &repository {
                    Some(url) => {
                        output.repository = Some(url.clone());
                        String::new()
                    }
                    None => {
                        let name = format!("sdlc-project-{}", paths::unix_timestamp());
                        match self.host.create_repository(&name, REPO_DESCRIPTION).await {
                            Some(url) => {
                                let msg = format!(" | Repository created: {url}");
                                output.repository = Some(url);
                                msg
                            }
                            None => " | GitHub repository creation skipped (No valid token)".to_string(),
                        }
                    }
                };
                format!("UI/UX specifications generated{repo_msg}. Proceed to Architecture.")
            }
            WorkflowStep::Architecture => {
                if let Some(url) = &repository {
                    if let Some(id) = &output.file_id {
                        self.push_report(url, id, &mut warnings).await;
                    }
                    self.push_doc(url, "architecture_design", &output.text, &mut warnings)
                        .await;
                }
                "System Architecture designed and pushed to GitHub. Proceed to Impact Analysis."
                    .to_string()
            }
            WorkflowStep::ImpactAnalysis => {
                "Technical and Business impact analysis completed successfully. Download the full report below."
                    .to_string()
            }
            WorkflowStep::Coding => {
                if let (Some(url), Some(dir)) = (&repository, &output.local_path) {
                    match self.host.push_directory(url, dir).await {
                        Ok(statuses) => pushed_files = Some(statuses),
                        Err(e) => {
                            warn!(repo = %url, error = %e, "generated code push failed");
                            warnings.push(format!("Pushing generated code failed: {e}"));
                        }
                    }
                }
                "Source code generated successfully. Proceed to Automated Testing.".to_string()
            }
            WorkflowStep::Testing => {
                let stats = output.statistics.clone().unwrap_or_default();
                format!(
                    "Testing analysis completed. Found {} functions and {} classes. Download the full report below.",
                    stat(&stats, "total_functions"),
                    stat(&stats, "total_classes"),
                )
            }
            WorkflowStep::SecurityScanning => {
                let stats = output.statistics.clone().unwrap_or_default();
                format!(
                    "Security scan completed. Analyzed {} files, found {} security issues. Review the report and proceed to Code Review.",
                    stat(&stats, "total_files"),
                    stat(&stats, "security_issues"),
                )
            }
            WorkflowStep::CodeReview => {
                if let Some(url) = &repository {
                    self.push_doc(url, "code_review", &output.text, &mut warnings)
                        .await;
                }
                "SDLC workflow completed successfully! Code and Review pushed to GitHub.".to_string()
            }
        };

        let mut result = AgentResult::success(step, output, message);
        result.pushed_files = pushed_files;
        result.warnings = warnings;
        result
    }

    async fn push_report(&self, url: &str, file_id: &str, warnings: &mut Vec<String>) {
        let target = paths::architecture_pdf_target(file_id);
        let pushed = match self.registry.resolve(file_id) {
            Ok(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => self
                    .host
                    .push_file(url, &target, &bytes, "Add Architecture PDF Report")
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = pushed {
            warn!(repo = url, target = %target, error = %e, "report push failed");
            warnings.push(format!("Pushing {target} failed: {e}"));
        }
    }

    async fn push_doc(&self, url: &str, key: &str, body: &str, warnings: &mut Vec<String>) {
        let outputs = BTreeMap::from([(key.to_string(), body.to_string())]);
        if let Err(e) = self.host.push_markdown(url, &outputs).await {
            warn!(repo = url, doc = key, error = %e, "markdown push failed");
            warnings.push(format!("Pushing docs/{key}.md failed: {e}"));
        }
    }
}

fn stat(stats: &Statistics, key: &str) -> u64 {
    stats.get(key).copied().unwrap_or(0)
}
