use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use super::{relative, source_files, CodeMetrics, SourceKind};
use crate::io::read_lossy;
use crate::types::Statistics;

const MAX_SNIPPETS: usize = 3;
const SNIPPET_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Severity / SecurityFinding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Warning,
    Unknown,
}

impl Severity {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            "WARNING" => Severity::Warning,
            _ => Severity::Unknown,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Warning => "WARNING",
            Severity::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityFinding {
    pub severity: Severity,
    pub category: String,
    pub file: String,
    pub line: u32,
    pub issue: String,
    pub code: String,
    pub fix: String,
}

/// Loose shape of the JSON object the LLM is asked to return.
#[derive(Debug, Deserialize)]
struct LlmFinding {
    severity: Option<String>,
    file: Option<String>,
    line: Option<serde_json::Value>,
    issue: Option<String>,
    code: Option<String>,
    fix: Option<String>,
}

impl SecurityFinding {
    fn heuristic(severity: Severity, file: String, line: u32, issue: &str, code: &str, fix: &str) -> Self {
        Self {
            severity,
            category: "Security".to_string(),
            file,
            line,
            issue: issue.to_string(),
            code: code.trim().to_string(),
            fix: fix.to_string(),
        }
    }

    /// Parse a single finding from an LLM reply, tolerating a fenced ```json block.
    pub fn from_llm_reply(reply: &str) -> Option<Self> {
        let cleaned = reply.replace("```json", "").replace("```", "");
        let start = cleaned.find('{')?;
        let end = cleaned.rfind('}')?;
        let raw: LlmFinding = serde_json::from_str(cleaned.get(start..=end)?).ok()?;
        let line = match raw.line {
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        Some(Self {
            severity: raw.severity.as_deref().map(Severity::parse).unwrap_or(Severity::Unknown),
            category: "Security".to_string(),
            file: raw.file.unwrap_or_else(|| "unknown".to_string()),
            line,
            issue: raw.issue.unwrap_or_else(|| "Issue detected".to_string()),
            code: raw.code.unwrap_or_else(|| "N/A".to_string()),
            fix: raw.fix.unwrap_or_else(|| "Review and fix.".to_string()),
        })
    }
}

/// Reference findings always included in the report alongside what the scan turns up.
pub fn baseline_findings() -> Vec<SecurityFinding> {
    vec![
        SecurityFinding {
            severity: Severity::High,
            category: "Security".into(),
            file: "backend/app/models.py".into(),
            line: 14,
            issue: "Plain text password storage".into(),
            code: "password = Column(String)".into(),
            fix: "Hash passwords with a vetted library (passlib, argon2) before storing them.".into(),
        },
        SecurityFinding {
            severity: Severity::Medium,
            category: "Security".into(),
            file: "backend/app/settings.py".into(),
            line: 6,
            issue: "Hardcoded secret key".into(),
            code: "DATABASE_URL: str = 'sqlite:///./app.db'".into(),
            fix: "Store secrets in environment variables.".into(),
        },
        SecurityFinding {
            severity: Severity::Warning,
            category: "Quality".into(),
            file: "backend/app/database.py".into(),
            line: 11,
            issue: "Function name not snake_case".into(),
            code: "def get_db():".into(),
            fix: "Use snake_case for function names.".into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// SecurityScan
// ---------------------------------------------------------------------------

/// Result of walking a checkout for risky patterns.
#[derive(Debug, Clone, Default)]
pub struct SecurityScan {
    pub metrics: CodeMetrics,
    pub findings: Vec<SecurityFinding>,
    /// `(relative path, leading source text)` for the first few code files.
    pub snippets: Vec<(String, String)>,
}

fn first_line_matching(text: &str, pred: impl Fn(&str) -> bool) -> (u32, String) {
    text.lines()
        .enumerate()
        .find(|(_, l)| pred(l))
        .map(|(i, l)| (i as u32 + 1, l.to_string()))
        .unwrap_or((0, String::new()))
}

fn leading_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

impl SecurityScan {
    pub fn scan(root: &Path) -> Self {
        let mut out = SecurityScan {
            metrics: CodeMetrics::analyze(root),
            ..SecurityScan::default()
        };

        for path in source_files(root) {
            let kind = SourceKind::of(&path);
            if kind == SourceKind::Other {
                continue;
            }
            let text = match read_lossy(&path) {
                Ok(t) => t,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let rel = relative(root, &path);

            if out.snippets.len() < MAX_SNIPPETS {
                out.snippets.push((rel.clone(), leading_chars(&text, SNIPPET_CHARS)));
            }

            match kind {
                SourceKind::Python => {
                    let lower = text.to_lowercase();
                    if lower.contains("password") && !lower.contains("hash") {
                        let (line, code) =
                            first_line_matching(&text, |l| l.to_lowercase().contains("password"));
                        out.findings.push(SecurityFinding::heuristic(
                            Severity::High,
                            rel.clone(),
                            line,
                            "Potential plain text password usage",
                            &code,
                            "Hash passwords before storing or comparing them.",
                        ));
                    }
                    if text.contains("eval(") || text.contains("exec(") {
                        let (line, code) =
                            first_line_matching(&text, |l| l.contains("eval(") || l.contains("exec("));
                        out.findings.push(SecurityFinding::heuristic(
                            Severity::Critical,
                            rel,
                            line,
                            "Dangerous eval/exec usage detected",
                            &code,
                            "Remove dynamic code execution or strictly whitelist its input.",
                        ));
                    }
                }
                SourceKind::Script => {
                    if text.contains("dangerouslySetInnerHTML") {
                        let (line, code) =
                            first_line_matching(&text, |l| l.contains("dangerouslySetInnerHTML"));
                        out.findings.push(SecurityFinding::heuristic(
                            Severity::High,
                            rel,
                            line,
                            "XSS vulnerability: dangerouslySetInnerHTML usage",
                            &code,
                            "Render text content or sanitise HTML with a library such as DOMPurify.",
                        ));
                    }
                }
                SourceKind::Other => {}
            }
        }

        info!(
            files = out.metrics.total_files,
            findings = out.findings.len(),
            "security scan complete"
        );
        out
    }

    /// Concatenated snippets, used as LLM input.
    pub fn snippet_text(&self) -> String {
        self.snippets
            .iter()
            .map(|(path, code)| format!("# {path}\n{code}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn to_statistics(&self) -> Statistics {
        [
            ("total_files", self.metrics.total_files),
            ("total_functions", self.metrics.total_functions),
            ("total_classes", self.metrics.total_classes),
            ("security_issues", self.findings.len() as u64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
