//! Rule-based code review over generated source, tests and security notes.
//!
//! Each of eight categories starts from a base score and moves up or down as
//! marker strings are found in the inputs. Nothing here calls the LLM.

use async_trait::async_trait;
use tracing::info;

use super::{Services, StepHandler};
use crate::error::Result;
use crate::io::atomic_write;
use crate::paths;
use crate::types::{AgentOutput, StepContext};

// ---------------------------------------------------------------------------
// Review model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReview {
    pub name: &'static str,
    pub score: u32,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl Rating {
    pub fn for_score(score: u32) -> Self {
        match score {
            90.. => Rating::Excellent,
            80..=89 => Rating::Good,
            70..=79 => Rating::Fair,
            _ => Rating::NeedsImprovement,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Fair => "Fair",
            Rating::NeedsImprovement => "Needs Improvement",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Rating::Excellent => "Code meets high quality standards with minimal issues.",
            Rating::Good => "Code quality is good with some areas for improvement.",
            Rating::Fair => "Code quality is acceptable but needs attention in several areas.",
            Rating::NeedsImprovement => {
                "Code quality requires significant improvements before production."
            }
        }
    }
}

/// Inputs to a review. `prd` is accepted for context but does not affect scores.
#[derive(Debug, Clone, Default)]
pub struct ReviewInput<'a> {
    pub code: &'a str,
    pub tests: &'a str,
    pub security: &'a str,
    pub prd: &'a str,
}

#[derive(Debug, Clone)]
pub struct CodeReview {
    pub categories: Vec<CategoryReview>,
    pub overall: u32,
    pub rating: Rating,
}

/// Score tracker that clamps at zero when read.
struct Tally {
    score: i32,
    issues: Vec<String>,
    suggestions: Vec<String>,
}

impl Tally {
    fn new(base: i32) -> Self {
        Self {
            score: base,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn issue(&mut self, penalty: i32, text: impl Into<String>) {
        self.score -= penalty;
        self.issues.push(text.into());
    }

    fn suggest(&mut self, text: impl Into<String>) {
        self.suggestions.push(text.into());
    }

    fn suggest_all(&mut self, items: &[&str]) {
        self.suggestions.extend(items.iter().map(|s| s.to_string()));
    }

    fn finish(self, name: &'static str) -> CategoryReview {
        CategoryReview {
            name,
            score: self.score.max(0) as u32,
            issues: self.issues,
            suggestions: self.suggestions,
        }
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

fn code_quality(code: &str) -> CategoryReview {
    let mut t = Tally::new(85);
    let checks: [(&str, bool); 5] = [
        ("Type Hints", code.contains(": str") || code.contains(": int")),
        ("Docstrings", code.contains("\"\"\"")),
        ("Error Handling", code.contains("try:") || code.contains("except")),
        ("Constants", code.chars().any(|c| c.is_uppercase()) && !code.chars().any(|c| c.is_lowercase()) && code.contains('=')),
        ("Function Length", true),
    ];
    for (check, passed) in checks {
        if passed {
            t.suggest(format!("Good use of {check}"));
        } else {
            t.issue(5, format!("Missing or insufficient {}", check.to_lowercase()));
        }
    }
    t.suggest_all(&[
        "Consider adding more comprehensive type hints",
        "Add docstrings to all public functions and classes",
        "Implement consistent error handling patterns",
        "Use constants for magic numbers and strings",
    ]);
    t.finish("Code Quality")
}

fn performance(code: &str) -> CategoryReview {
    let mut t = Tally::new(80);
    if code.contains("async def") {
        t.score += 5;
        t.suggest("Good use of async/await for I/O operations");
    } else {
        t.issue(5, "Consider using async/await for I/O bound operations");
    }
    if code.contains("Session") && code.contains("close()") {
        t.suggest("Database sessions are properly closed");
    } else {
        t.issue(5, "Ensure proper database session cleanup");
    }
    t.suggest_all(&[
        "Implement database connection pooling",
        "Add caching for frequently accessed data",
        "Use pagination for large result sets",
        "Add database indexes for frequently queried fields",
        "Implement query optimization and eager loading",
    ]);
    t.finish("Performance")
}

fn security(code: &str) -> CategoryReview {
    let mut t = Tally::new(75);
    if code.to_lowercase().contains("hash") {
        t.score += 10;
        t.suggest("Password hashing implemented");
    } else {
        t.issue(10, "Implement password hashing");
    }
    if code.contains("Depends(") {
        t.score += 5;
        t.suggest("Dependency injection used for request handling");
    }
    if code.contains("HTTPException") {
        t.score += 5;
        t.suggest("Proper HTTP error responses");
    }
    t.suggest_all(&[
        "Implement JWT token authentication",
        "Add rate limiting to prevent abuse",
        "Validate and sanitize all user inputs",
        "Use HTTPS in production",
        "Implement CORS policies carefully",
        "Add security headers (CSP, HSTS, X-Frame-Options)",
    ]);
    t.finish("Security")
}

fn maintainability(code: &str) -> CategoryReview {
    let mut t = Tally::new(85);
    if code.contains("class") && code.contains("def") {
        t.suggest("Code is organized into classes and functions");
    }
    if code.contains("import") {
        t.suggest("Modular imports are used");
    }
    if code.lines().count() > 1000 {
        t.issue(10, "Large files detected, consider splitting into smaller modules");
    }
    t.suggest_all(&[
        "Follow SOLID principles",
        "Keep functions small and focused",
        "Use meaningful variable and function names",
        "Add comments for complex logic",
        "Implement consistent code formatting",
    ]);
    t.finish("Maintainability")
}

fn documentation(code: &str) -> CategoryReview {
    let mut t = Tally::new(70);
    let docstrings = code.matches("\"\"\"").count() as i32;
    if docstrings > 0 {
        t.suggest(format!("Found {} docstrings", docstrings / 2));
        t.score += (docstrings * 2).min(20);
    } else {
        t.issue(15, "No docstrings found");
    }
    if code.contains("# ") {
        t.score += 5;
    }
    t.suggest_all(&[
        "Add comprehensive API documentation",
        "Include usage examples in docstrings",
        "Document environment variables and configuration",
        "Create a detailed README with setup instructions",
        "Add inline comments for complex algorithms",
    ]);
    t.finish("Documentation")
}

fn testing(tests: &str) -> CategoryReview {
    let mut t = Tally::new(80);
    if tests.trim().is_empty() {
        t.issue(30, "No test content provided");
    } else {
        if tests.contains("pytest") {
            t.score += 10;
            t.suggest("Using pytest framework");
        }
        if tests.contains("assert") {
            t.score += 5;
        }
        if tests.contains("fixture") {
            t.score += 5;
            t.suggest("Test fixtures are used");
        }
        let cases = tests.matches("def test_").count() as i32;
        t.score += cases.min(20);
    }
    t.suggest_all(&[
        "Aim for 80%+ code coverage",
        "Add integration tests for API endpoints",
        "Include edge case testing",
        "Add performance and load tests",
        "Implement continuous testing in CI/CD",
    ]);
    t.finish("Testing")
}

fn architecture(code: &str) -> CategoryReview {
    let mut t = Tally::new(85);
    if code.contains("router") {
        t.suggest("Routes are organized with routers");
    }
    if code.contains("models") && code.contains("schemas") {
        t.score += 10;
        t.suggest("Clear separation between models and schemas");
    }
    if code.contains("database") {
        t.suggest("Database layer is separated");
    }
    t.suggest_all(&[
        "Consider implementing a service layer",
        "Use the repository pattern for data access",
        "Implement dependency injection consistently",
        "Separate business logic from API routes",
        "Consider an event-driven design for scalability",
    ]);
    t.finish("Architecture")
}

fn best_practices(code: &str) -> CategoryReview {
    let mut t = Tally::new(80);
    let lower = code.to_lowercase();
    let practices = [
        ("PEP 8 Compliance", "import"),
        ("Error Handling", "httpexception"),
        ("Configuration Management", "settings"),
        ("Dependency Management", "requirements"),
        ("Environment Variables", "env"),
    ];
    for (practice, marker) in practices {
        if lower.contains(marker) {
            t.score += 2;
        } else {
            t.issues.push(format!("Consider implementing {practice}"));
        }
    }
    t.suggest_all(&[
        "Follow PEP 8 style guidelines",
        "Use type hints consistently",
        "Implement proper logging",
        "Use environment variables for configuration",
        "Keep dependencies up to date",
        "Write self-documenting code",
    ]);
    t.finish("Best Practices")
}

/// Score every category and derive the overall rating.
pub fn review(input: &ReviewInput<'_>) -> CodeReview {
    let code = input.code;
    let categories = vec![
        code_quality(code),
        performance(code),
        security(code),
        maintainability(code),
        documentation(code),
        testing(input.tests),
        architecture(code),
        best_practices(code),
    ];
    let total: u32 = categories.iter().map(|c| c.score).sum();
    let overall = (total as f64 / categories.len() as f64).round() as u32;
    CodeReview {
        categories,
        overall,
        rating: Rating::for_score(overall),
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

fn status(score: u32) -> &'static str {
    match score {
        80.. => "Good",
        60..=79 => "Needs Work",
        _ => "Critical",
    }
}

const ROADMAP: [(&str, [&str; 3]); 4] = [
    (
        "Phase 1: Critical Fixes (Week 1)",
        [
            "Address all security vulnerabilities",
            "Fix critical bugs and errors",
            "Implement proper error handling",
        ],
    ),
    (
        "Phase 2: Quality Improvements (Week 2-3)",
        [
            "Add comprehensive tests",
            "Improve documentation",
            "Refactor complex functions",
        ],
    ),
    (
        "Phase 3: Performance Optimization (Week 4)",
        [
            "Implement caching",
            "Optimize database queries",
            "Add monitoring and logging",
        ],
    ),
    (
        "Phase 4: Production Readiness (Week 5)",
        [
            "Set up CI/CD pipeline",
            "Configure production environment",
            "Conduct security audit",
        ],
    ),
];

const CHECKLIST: [&str; 12] = [
    "Code follows PEP 8 style guidelines",
    "All functions have type hints",
    "All public APIs are documented",
    "Error handling is comprehensive",
    "Security best practices are followed",
    "Tests cover critical paths",
    "Database queries are optimized",
    "Environment variables are used for configuration",
    "Logging is implemented",
    "API responses are consistent",
    "Input validation is in place",
    "Dependencies are up to date",
];

/// Markdown report for `review`, tagged with `review_id`.
pub fn render_report(review: &CodeReview, review_id: &str) -> String {
    let mut md = format!(
        "# Code Review Report\n\n## Executive Summary\n\n\
         **Overall Code Quality Score: {overall}/100**\n\n\
         **Review Date:** {date}\n\n\
         **Rating:** {label} - {summary}\n\n---\n\n## Detailed Review\n\n",
        overall = review.overall,
        date = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
        label = review.rating.label(),
        summary = review.rating.summary(),
    );

    for cat in &review.categories {
        md.push_str(&format!("### {} ({}/100)\n\n", cat.name, cat.score));
        if !cat.issues.is_empty() {
            md.push_str("**Issues to Address:**\n");
            for issue in &cat.issues {
                md.push_str(&format!("- {issue}\n"));
            }
            md.push('\n');
        }
        if !cat.suggestions.is_empty() {
            md.push_str("**Suggestions & Improvements:**\n");
            for s in &cat.suggestions {
                md.push_str(&format!("- {s}\n"));
            }
            md.push('\n');
        }
    }

    md.push_str(
        "---\n\n## Priority Recommendations\n\n\
         1. **Security**: Implement authentication, password hashing and input validation\n\
         2. **Testing**: Increase test coverage to at least 80%\n\
         3. **Documentation**: Add docstrings and API documentation\n\
         4. **Performance**: Add caching and optimize database queries\n\
         5. **Error Handling**: Implement consistent error handling across all endpoints\n\n\
         ## Code Quality Metrics\n\n\
         | Category | Score | Status |\n\
         |----------|-------|--------|\n",
    );
    for cat in &review.categories {
        md.push_str(&format!("| {} | {}/100 | {} |\n", cat.name, cat.score, status(cat.score)));
    }

    md.push_str("\n## Implementation Roadmap\n\n");
    for (phase, tasks) in ROADMAP {
        md.push_str(&format!("### {phase}\n"));
        for task in tasks {
            md.push_str(&format!("- [ ] {task}\n"));
        }
        md.push('\n');
    }

    md.push_str("## Best Practices Checklist\n\n");
    for item in CHECKLIST {
        md.push_str(&format!("- [ ] {item}\n"));
    }

    md.push_str(
        "\n## Recommended Tools & Resources\n\n\
         - **Code Quality**: pylint, black, flake8, mypy\n\
         - **Testing**: pytest, pytest-cov, pytest-asyncio\n\
         - **Security**: bandit, safety, OWASP ZAP\n\
         - **Documentation**: Sphinx, MkDocs, Swagger/OpenAPI\n\
         - **Monitoring**: Prometheus, Grafana, Sentry\n\n",
    );

    let closing = if review.overall >= 80 {
        "The codebase is in good shape for production deployment after addressing the priority recommendations."
    } else {
        "Significant improvements are needed before production deployment. Focus on the Phase 1 and Phase 2 items first."
    };
    md.push_str(&format!(
        "## Conclusion\n\n\
         The generated code shows a **{}** level of quality with an overall score of **{}/100**. {closing}\n\n\
         ---\n\n**Review ID:** {review_id}\n",
        review.rating.label().to_lowercase(),
        review.overall,
    ));
    md
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Step 7: review the generated code and write `code_review_{ts}.md`.
pub struct CodeReviewAgent {
    services: Services,
}

impl CodeReviewAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl StepHandler for CodeReviewAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        let mut code = ctx.query.clone();
        for file in &ctx.files {
            if let Some(text) = file.text() {
                code.push_str(&format!("\n\n# {}\n{text}", file.filename));
            }
        }

        let result = review(&ReviewInput {
            code: &code,
            tests: "",
            security: "",
            prd: &ctx.query,
        });
        let ts = paths::unix_timestamp();
        let report = render_report(&result, &format!("CR-{ts}"));

        let path = self
            .services
            .output_dir
            .join(format!("{}.md", paths::unique_name("code_review")));
        atomic_write(&path, report.as_bytes())?;
        info!(path = %path.display(), score = result.overall, "code review written");

        Ok(AgentOutput {
            text: report,
            repository: ctx.repository().map(String::from),
            local_path: Some(path),
            ..AgentOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services_in, CannedLlm};
    use tempfile::TempDir;

    fn score(review: &CodeReview, name: &str) -> u32 {
        review
            .categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.score)
            .unwrap()
    }

    #[test]
    fn empty_input_scores() {
        let r = review(&ReviewInput::default());
        // 85-20, 80-10, 75-10, 85, 70-15, 80-30, 85, 80
        assert_eq!(score(&r, "Code Quality"), 65);
        assert_eq!(score(&r, "Performance"), 70);
        assert_eq!(score(&r, "Security"), 65);
        assert_eq!(score(&r, "Maintainability"), 85);
        assert_eq!(score(&r, "Documentation"), 55);
        assert_eq!(score(&r, "Testing"), 50);
        assert_eq!(score(&r, "Architecture"), 85);
        assert_eq!(score(&r, "Best Practices"), 80);
        assert_eq!(r.overall, 69);
        assert_eq!(r.rating, Rating::NeedsImprovement);
    }

    #[test]
    fn markers_raise_scores() {
        let code = r#"
import os
from fastapi import Depends, HTTPException
from .models import User
from .schemas import UserOut

async def get_user(name: str, db: Session = Depends(get_db)):
    """Fetch a user."""
    try:
        return hash_password(name)
    except KeyError:
        raise HTTPException(404)
    finally:
        db.close()
"#;
        let tests = "import pytest\n\n@pytest.fixture\ndef client(): ...\n\ndef test_a():\n    assert True\n";
        let r = review(&ReviewInput {
            code,
            tests,
            ..ReviewInput::default()
        });
        // Constants check fails: 85 - 5.
        assert_eq!(score(&r, "Code Quality"), 80);
        assert_eq!(score(&r, "Performance"), 85);
        assert_eq!(score(&r, "Security"), 95);
        // 2 docstring markers: +4, no "# ".
        assert_eq!(score(&r, "Documentation"), 74);
        assert_eq!(score(&r, "Testing"), 101);
        assert_eq!(score(&r, "Architecture"), 95);
        // import + httpexception present.
        assert_eq!(score(&r, "Best Practices"), 84);
    }

    #[test]
    fn rating_thresholds() {
        assert_eq!(Rating::for_score(90), Rating::Excellent);
        assert_eq!(Rating::for_score(89), Rating::Good);
        assert_eq!(Rating::for_score(70), Rating::Fair);
        assert_eq!(Rating::for_score(69), Rating::NeedsImprovement);
    }

    #[test]
    fn report_has_sections() {
        let r = review(&ReviewInput::default());
        let md = render_report(&r, "CR-42");
        assert!(md.starts_with("# Code Review Report"));
        assert!(md.contains("**Overall Code Quality Score: 69/100**"));
        assert!(md.contains("### Testing (50/100)"));
        assert!(md.contains("| Documentation | 55/100 | Critical |"));
        assert!(md.contains("| Maintainability | 85/100 | Good |"));
        assert!(md.contains("- [ ] Set up CI/CD pipeline"));
        assert!(md.contains("a **needs improvement** level of quality"));
        assert!(md.ends_with("**Review ID:** CR-42\n"));
    }

    #[tokio::test]
    async fn produce_writes_review_file() {
        let dir = TempDir::new().unwrap();
        let agent = CodeReviewAgent::new(services_in(dir.path(), CannedLlm::failing()));
        let out = agent.produce(&StepContext::new("def main(): pass")).await.unwrap();
        let path = out.local_path.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("code_review_"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), out.text);
    }

    #[tokio::test]
    async fn repeated_reviews_do_not_overwrite_each_other() {
        let dir = TempDir::new().unwrap();
        let agent = CodeReviewAgent::new(services_in(dir.path(), CannedLlm::failing()));
        let first = agent.produce(&StepContext::new("def a(): pass")).await.unwrap();
        let second = agent.produce(&StepContext::new("def b(): pass")).await.unwrap();
        assert_ne!(first.local_path, second.local_path);
        assert!(first.local_path.unwrap().is_file());
    }
}
