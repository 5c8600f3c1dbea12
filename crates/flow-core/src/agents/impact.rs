use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use super::{blocking, truncate, LineFilter, Services, StepHandler};
use crate::error::Result;
use crate::scan::RepoSurvey;
use crate::types::{AgentOutput, StepContext};

const SYSTEM_PROMPT: &str = "You are Agent-3: Principal Impact Analyst & Enterprise Architecture Evaluator.
Produce a formal, executive-ready Impact Analysis Report in Markdown from the
requirements, architecture blueprint and repository facts you are given.

MANDATORY SECTIONS:
1. Project Summary (overview, business goals, user flows, platform scope)
2. Technical Impact
3. Business Impact
4. Scalability Impact
5. Security Impact
6. Cost & Operational Impact
7. Technology Risks & Alternatives
8. Resource Requirements
9. Timeline Analysis
10. Scorecard (1-10: technical robustness, scalability, security, maintainability, business alignment)
11. Recommendations & Next Steps

Use clear headings and tables where applicable. No emojis, no casual tone, no
assumptions that the inputs do not support.";

const DEFAULT_PRD: &str = "Source Project Context";

const FEATURE_FILTER: LineFilter<'static> = LineFilter {
    keywords: &["feature", "functionality", "requirement", "endpoint", "module"],
    bullets: &['-', '\u{2022}', '*', '#', ' '],
    min_len: 8,
    max_len: 150,
};

/// `(level, indicators)`, checked in order; the first level with a hit wins.
const COMPLEXITY_INDICATORS: &[(Complexity, &[&str])] = &[
    (
        Complexity::High,
        &["machine learning", "ai", "real-time", "microservices", "blockchain", "streaming", "security-critical"],
    ),
    (
        Complexity::Medium,
        &["api", "database", "authentication", "payment", "notification", "dashboard"],
    ),
    (Complexity::Low, &["crud", "simple", "basic", "static", "profile"]),
];

const INTEGRATION_KEYWORDS: &[&str] = &["payment", "email", "sms", "social", "api", "third-party", "gateway"];
const COMPLIANCE_KEYWORDS: &[&str] = &["gdpr", "hipaa", "pci", "sox", "privacy", "security", "encryption"];

const DEFAULT_FEATURES: &[&str] = &["Core API Development", "User Management System", "Data Persistence Layer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scale {
    Small,
    Medium,
    Large,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Keyword-derived profile of the project being analysed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectProfile {
    pub complexity: Complexity,
    pub scale: Scale,
    pub features: Vec<String>,
    pub integrations: Vec<String>,
    pub compliance: Vec<String>,
}

impl ProjectProfile {
    pub fn extract(prd: &str, architecture: &str) -> Self {
        let combined = format!("{prd}\n{architecture}");
        let lower = combined.to_lowercase();

        let complexity = COMPLEXITY_INDICATORS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(level, _)| *level)
            .unwrap_or(Complexity::Medium);

        let mut features = FEATURE_FILTER.extract(&combined);
        if features.is_empty() {
            features = DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect();
        }
        let scale = match features.len() {
            n if n > 12 => Scale::Large,
            n if n > 5 => Scale::Medium,
            _ => Scale::Small,
        };

        let integrations = INTEGRATION_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .map(|k| title_case(k))
            .collect();
        let compliance = COMPLIANCE_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .map(|k| k.to_uppercase())
            .collect();

        Self {
            complexity,
            scale,
            features,
            integrations,
            compliance,
        }
    }

    /// Rough delivery window, e.g. `"6-7 months"`.
    pub fn development_estimate(&self) -> String {
        let base = match self.scale {
            Scale::Small => 3.0,
            Scale::Medium => 6.0,
            Scale::Large => 12.0,
        };
        let factor = match self.complexity {
            Complexity::Low => 0.8,
            Complexity::Medium => 1.0,
            Complexity::High => 1.5,
        };
        let months: f64 = base * factor;
        format!("{}-{} months", months as u32, (months * 1.2) as u32)
    }
}

/// `third-party` -> `Third-Party`.
fn title_case(word: &str) -> String {
    word.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// What the repository contributed to the prompt.
enum RepoContext {
    None,
    Surveyed(RepoSurvey),
    Unavailable(String),
}

/// Step 3: business and technical impact of the proposed architecture.
pub struct ImpactAgent {
    services: Services,
}

impl ImpactAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn repo_context(&self, repository: Option<&str>) -> RepoContext {
        let Some(url) = repository else {
            return RepoContext::None;
        };
        let repo = match self.services.checkout(url).await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "impact analysis continuing without repository");
                return RepoContext::Unavailable(e.to_string());
            }
        };
        let url = url.to_string();
        match blocking(move || RepoSurvey::survey(repo.path(), &url)).await {
            Ok(s) => RepoContext::Surveyed(s),
            Err(e) => RepoContext::Unavailable(e.to_string()),
        }
    }

    fn user_prompt(
        prd: &str,
        architecture: &str,
        repository: Option<&str>,
        profile: &ProjectProfile,
        repo: &RepoContext,
    ) -> String {
        let or_missing = |s: &str, n: usize| {
            if s.trim().is_empty() {
                "Not provided".to_string()
            } else {
                truncate(s, n)
            }
        };

        let repo_section = match repo {
            RepoContext::None => String::new(),
            RepoContext::Surveyed(s) => {
                let languages: Vec<&str> = s.languages.keys().take(5).map(String::as_str).collect();
                let dirs: Vec<&str> = s.top_level_dirs.iter().take(10).map(String::as_str).collect();
                let stack: Vec<&str> = s
                    .frontend
                    .iter()
                    .chain(&s.backend)
                    .chain(&s.databases)
                    .map(String::as_str)
                    .collect();
                format!(
                    "\nREPOSITORY ANALYSIS:\nLanguages Detected: {}\nFile Structure Sample: {}\nTechnology Stack: {}\nFiles: {}\nEndpoints: {}\n",
                    languages.join(", "),
                    dirs.join(", "),
                    stack.join(", "),
                    s.total_files,
                    s.endpoints.len(),
                )
            }
            RepoContext::Unavailable(reason) => format!(
                "\nREPOSITORY ANALYSIS:\nRepository clone failed - analysis based on URL only ({reason})\n"
            ),
        };

        format!(
            "ANALYZE THE FOLLOWING CONTEXT AND GENERATE THE IMPACT REPORT:\n\n\
             PRD CONTENT:\n{prd}\n\n\
             ARCHITECTURE BLUEPRINT (Agent-2 Output):\n{arch}\n\
             {repo_section}\n\
             GITHUB REPOSITORY: {url}\n\
             CURRENT TIMESTAMP: {now}\n\
             PROJECT SCALE: {scale}\n\
             COMPLEXITY: {complexity}\n\
             FEATURES COUNT: {features}\n\
             INTEGRATIONS: {integrations}\n\
             COMPLIANCE: {compliance}\n\
             ESTIMATED DEVELOPMENT TIME: {estimate}\n",
            prd = or_missing(prd, 2000),
            arch = or_missing(architecture, 3000),
            url = repository.unwrap_or("N/A"),
            now = chrono::Utc::now().to_rfc3339(),
            scale = profile.scale,
            complexity = profile.complexity,
            features = profile.features.len(),
            integrations = profile.integrations.join(", "),
            compliance = profile.compliance.join(", "),
            estimate = profile.development_estimate(),
        )
    }
}

#[async_trait]
impl StepHandler for ImpactAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        // The previous step's architecture document arrives as the query;
        // uploaded documents, if any, stand in for the PRD.
        let uploaded: Vec<&str> = ctx.files.iter().filter_map(|f| f.text()).collect();
        let prd = if uploaded.is_empty() {
            DEFAULT_PRD.to_string()
        } else {
            uploaded.join("\n\n")
        };
        let architecture = ctx.query.as_str();
        let repository = ctx.repository();

        let profile = ProjectProfile::extract(&prd, architecture);
        info!(
            complexity = %profile.complexity,
            scale = %profile.scale,
            features = profile.features.len(),
            "project profile extracted"
        );

        let repo = self.repo_context(repository).await;
        let prompt = Self::user_prompt(&prd, architecture, repository, &profile, &repo);
        let report = self.services.ask(SYSTEM_PROMPT, &prompt).await?;

        let file_id = self
            .services
            .save_report("impact_analysis", "md", report.as_bytes())?;
        info!(file_id = %file_id, "impact analysis written");

        Ok(AgentOutput {
            text: report,
            file_id: Some(file_id),
            repository: repository.map(String::from),
            ..AgentOutput::default()
        })
    }
}
