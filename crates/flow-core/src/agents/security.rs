use async_trait::async_trait;
use tracing::{info, warn};

use super::{blocking, truncate, Services, StepHandler};
use crate::error::Result;
use crate::scan::security::baseline_findings;
use crate::scan::{SecurityFinding, SecurityScan};
use crate::types::{AgentOutput, StepContext};

const SYSTEM_PROMPT: &str = "You are a senior security researcher. return valid JSON only.";

/// Snippet text shorter than this is not worth an LLM review.
const MIN_SNIPPET_CHARS: usize = 50;
const SNIPPET_PROMPT_CHARS: usize = 2_000;

/// Markdown security report: repository numbers, then every finding.
pub fn render_report(
    scan: &SecurityScan,
    findings: &[SecurityFinding],
    repository: &str,
    scan_id: &str,
) -> String {
    let m = &scan.metrics;
    let mut md = format!(
        "# Security Scanning Report\n\n## Repository Analysis\n\
         - **Repository**: {repository}\n\
         - **Total Files Analyzed**: {}\n\
         - **Python Files**: {}\n\
         - **JS/TS Files**: {}\n\
         - **Total Functions**: {}\n\
         - **Total Classes**: {}\n\
         - **Security Issues Found**: {}\n\n---\n\n",
        m.total_files,
        m.python_files,
        m.js_files,
        m.total_functions,
        m.total_classes,
        scan.findings.len(),
    );

    let security = findings.iter().filter(|f| f.category == "Security").count();
    let quality = findings.iter().filter(|f| f.category == "Quality").count();
    md.push_str(&format!(
        "## Scan Summary\n\
         - **Scan ID**: {scan_id}\n\
         - **Scan Date**: {}\n\
         - **Total Issues**: {}\n\
         - **Security Issues**: {security}\n\
         - **Quality Issues**: {quality}\n\n\
         ## Detailed Issues\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
        findings.len(),
    ));

    for (i, f) in findings.iter().enumerate() {
        md.push_str(&format!(
            "### {n}. [{sev}] {issue}\n\
             - **Category**: {cat}\n\
             - **Location**: `{file}:{line}`\n\
             - **Code**: `{code}`\n\
             - **Fix**: {fix}\n\n",
            n = i + 1,
            sev = f.severity,
            issue = f.issue,
            cat = f.category,
            file = f.file,
            line = f.line,
            code = f.code,
            fix = f.fix,
        ));
    }
    md
}

/// Step 6: clone, scan for risky patterns, and report.
pub struct SecurityAgent {
    services: Services,
}

impl SecurityAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    async fn scan(&self, repository: Option<&str>) -> SecurityScan {
        let Some(url) = repository else {
            return SecurityScan::default();
        };
        let repo = match self.services.checkout(url).await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "security scan continuing without repository");
                return SecurityScan::default();
            }
        };
        blocking(move || SecurityScan::scan(repo.path()))
            .await
            .unwrap_or_default()
    }

    /// One LLM-reported finding for the scanned snippets, if the reply parses.
    async fn llm_finding(&self, snippets: &str) -> Option<SecurityFinding> {
        if snippets.chars().count() <= MIN_SNIPPET_CHARS {
            return None;
        }
        let prompt = format!(
            "Analyze the following code for one critical security vulnerability. \
             Return ONLY a JSON object with keys: severity (HIGH/MEDIUM/LOW), file, line, issue, code, fix.\n\n\
             CODE:\n{}",
            truncate(snippets, SNIPPET_PROMPT_CHARS)
        );
        match self.services.ask(SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => {
                let finding = SecurityFinding::from_llm_reply(&reply);
                if finding.is_none() {
                    warn!("security LLM reply was not a usable finding");
                }
                finding
            }
            Err(e) => {
                warn!(error = %e, "security LLM call failed");
                None
            }
        }
    }
}

#[async_trait]
impl StepHandler for SecurityAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        let repository = ctx.repository();
        let scan = self.scan(repository).await;

        let mut findings = baseline_findings();
        findings.extend(scan.findings.iter().cloned());
        if let Some(f) = self.llm_finding(&scan.snippet_text()).await {
            findings.push(f);
        }

        let scan_id = format!("SCAN-{}", crate::paths::unix_timestamp());
        let report = render_report(&scan, &findings, repository.unwrap_or("N/A"), &scan_id);

        let file_id = match self.services.save_pdf("security_scan", &report).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "security PDF generation failed, saving markdown");
                self.services
                    .save_report("security_report", "md", report.as_bytes())?
            }
        };
        info!(file_id = %file_id, findings = findings.len(), "security report written");

        Ok(AgentOutput {
            text: report,
            file_id: Some(file_id),
            statistics: Some(scan.to_statistics()),
            repository: repository.map(String::from),
            local_path: None,
        })
    }
}
