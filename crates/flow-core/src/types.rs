use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{FlowError, Result};

// ---------------------------------------------------------------------------
// WorkflowStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    UiUx = 1,
    Architecture = 2,
    ImpactAnalysis = 3,
    Coding = 4,
    Testing = 5,
    SecurityScanning = 6,
    CodeReview = 7,
}

impl WorkflowStep {
    pub fn all() -> &'static [WorkflowStep] {
        &[
            WorkflowStep::UiUx,
            WorkflowStep::Architecture,
            WorkflowStep::ImpactAnalysis,
            WorkflowStep::Coding,
            WorkflowStep::Testing,
            WorkflowStep::SecurityScanning,
            WorkflowStep::CodeReview,
        ]
    }

    /// Parse a caller-supplied step number. Anything outside 1..=7 is rejected.
    pub fn from_number(n: i64) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|s| s.number() as i64 == n)
            .ok_or(FlowError::InvalidStep(n))
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<WorkflowStep> {
        Self::all().get(self.number() as usize).copied()
    }

    pub fn agent_name(self) -> &'static str {
        match self {
            WorkflowStep::UiUx => "UI/UX Agent",
            WorkflowStep::Architecture => "Architecture Agent",
            WorkflowStep::ImpactAnalysis => "Impact Analysis Agent",
            WorkflowStep::Coding => "Coding Agent",
            WorkflowStep::Testing => "Testing Agent",
            WorkflowStep::SecurityScanning => "Security Scanning Agent",
            WorkflowStep::CodeReview => "Code Review Agent",
        }
    }

    /// Path segment used in `/api/agents/download/{slug}/{id}`.
    pub fn slug(self) -> &'static str {
        match self {
            WorkflowStep::UiUx => "uiux",
            WorkflowStep::Architecture => "architecture",
            WorkflowStep::ImpactAnalysis => "impact",
            WorkflowStep::Coding => "coding",
            WorkflowStep::Testing => "testing",
            WorkflowStep::SecurityScanning => "security",
            WorkflowStep::CodeReview => "review",
        }
    }

    pub fn download_url(self, file_id: &str) -> String {
        format!("/api/agents/download/{}/{file_id}", self.slug())
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.agent_name())
    }
}

// ---------------------------------------------------------------------------
// Step input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// The file body as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Everything a single step sees. The previous step's output travels in
/// `query`; nothing else is carried between steps.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub query: String,
    pub github_url: Option<String>,
    pub files: Vec<UploadedFile>,
}

impl StepContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_repository(mut self, url: impl Into<String>) -> Self {
        self.github_url = Some(url.into());
        self
    }

    /// The repository reference, with blank values treated as absent.
    pub fn repository(&self) -> Option<&str> {
        self.github_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Step output
// ---------------------------------------------------------------------------

/// Named counters reported by scanning steps (`total_files`, `total_functions`, ...).
pub type Statistics = BTreeMap<String, u64>;

/// What an agent hands back to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub text: String,
    pub file_id: Option<String>,
    pub statistics: Option<Statistics>,
    /// Repository the step created or worked against, if different from the input.
    pub repository: Option<String>,
    /// Directory the step wrote generated files into.
    pub local_path: Option<PathBuf>,
}

impl AgentOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

/// The JSON document returned for every orchestrated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    #[serde(default)]
    pub next_step: Option<u8>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_files: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl AgentResult {
    pub fn success(step: WorkflowStep, output: AgentOutput, message: impl Into<String>) -> Self {
        let download_url = output.file_id.as_deref().map(|id| step.download_url(id));
        Self {
            status: StepStatus::Success,
            step: Some(step.number()),
            agent: Some(step.agent_name().to_string()),
            output: Some(output.text),
            file_id: output.file_id,
            download_url,
            statistics: output.statistics,
            github_repo: output.repository,
            next_step: step.next().map(WorkflowStep::number),
            message: message.into(),
            pushed_files: None,
            warnings: Vec::new(),
        }
    }

    pub fn failure(step: Option<WorkflowStep>, message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Error,
            step: step.map(WorkflowStep::number),
            agent: step.map(|s| s.agent_name().to_string()),
            output: None,
            file_id: None,
            download_url: None,
            statistics: None,
            github_repo: None,
            next_step: None,
            message: message.into(),
            pushed_files: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_numbers_round_trip() {
        for step in WorkflowStep::all() {
            assert_eq!(WorkflowStep::from_number(step.number() as i64).unwrap(), *step);
        }
    }

    #[test]
    fn out_of_range_steps_rejected() {
        for n in [0, 8, 9, -1, 100] {
            assert!(matches!(
                WorkflowStep::from_number(n),
                Err(FlowError::InvalidStep(m)) if m == n
            ));
        }
    }

    #[test]
    fn next_step_chain() {
        assert_eq!(WorkflowStep::UiUx.next(), Some(WorkflowStep::Architecture));
        assert_eq!(
            WorkflowStep::SecurityScanning.next(),
            Some(WorkflowStep::CodeReview)
        );
        assert_eq!(WorkflowStep::CodeReview.next(), None);
    }

    #[test]
    fn download_url_uses_slug() {
        assert_eq!(
            WorkflowStep::ImpactAnalysis.download_url("abc"),
            "/api/agents/download/impact/abc"
        );
    }

    #[test]
    fn blank_repository_is_absent() {
        let ctx = StepContext::new("q").with_repository("   ");
        assert_eq!(ctx.repository(), None);
        let ctx = StepContext::new("q").with_repository(" https://github.com/a/b ");
        assert_eq!(ctx.repository(), Some("https://github.com/a/b"));
    }

    #[test]
    fn failure_serializes_without_optional_fields() {
        let r = AgentResult::failure(None, "Invalid step number");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["message"], "Invalid step number");
        assert!(v.get("step").is_none());
        assert!(v.get("output").is_none());
        assert!(v["next_step"].is_null());
    }

    #[test]
    fn success_fills_download_url_from_file_id() {
        let out = AgentOutput {
            text: "report".into(),
            file_id: Some("f1".into()),
            ..AgentOutput::default()
        };
        let r = AgentResult::success(WorkflowStep::Testing, out, "done");
        assert_eq!(r.download_url.as_deref(), Some("/api/agents/download/testing/f1"));
        assert_eq!(r.next_step, Some(6));
        assert_eq!(r.agent.as_deref(), Some("Testing Agent"));
    }
}
