use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{blocking, LineFilter, Services, StepHandler};
use crate::error::Result;
use crate::io::atomic_write;
use crate::scan::CodeMetrics;
use crate::templates::{self, FileSet};
use crate::types::{AgentOutput, StepContext};

const FEATURE_FILTER: LineFilter<'static> = LineFilter {
    keywords: &["feature", "functionality", "requirement"],
    bullets: &['-', '\u{2022}', '*'],
    min_len: 10,
    max_len: 100,
};

const DEFAULT_FEATURES: &[&str] = &["User authentication", "Data management", "API operations"];

const MAX_FEATURES: usize = 8;

/// Features the generated integration tests cover.
pub fn testable_features(context: &str) -> Vec<String> {
    let mut features: Vec<String> = FEATURE_FILTER
        .extract(&context.to_lowercase())
        .into_iter()
        .take(MAX_FEATURES)
        .collect();
    if features.is_empty() {
        features = DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect();
    }
    features
}

fn describe(filename: &str) -> &'static str {
    match filename {
        "test_main.py" => "Main application and health check tests",
        "test_models.py" => "Database model validation tests",
        "test_api.py" => "API endpoint functionality tests",
        "test_database.py" => "Database connection and schema tests",
        "test_integration.py" => "End-to-end workflow tests",
        "conftest.py" => "Pytest configuration and fixtures",
        "pytest.ini" => "Pytest settings and options",
        "requirements-test.txt" => "Testing dependencies",
        "README.md" => "Test suite documentation",
        _ => "Test file",
    }
}

/// Why the metrics are what they are.
pub enum MetricsSource<'a> {
    Scanned(&'a str),
    NoRepository,
    CloneFailed(&'a str),
}

/// Markdown testing report over `metrics` and the generated suite.
pub fn render_report(metrics: &CodeMetrics, suite: &FileSet, source: MetricsSource<'_>) -> String {
    let m = metrics;
    let mut md = String::from("# Comprehensive Testing Report\n\n## Code Analysis Summary\n\n");

    match source {
        MetricsSource::Scanned(url) => md.push_str(&format!("**Repository:** {url}\n\n")),
        MetricsSource::NoRepository => {
            md.push_str("> No repository was supplied; repository statistics are empty.\n\n")
        }
        MetricsSource::CloneFailed(reason) => md.push_str(&format!(
            "> Repository could not be cloned ({reason}); repository statistics are empty.\n\n"
        )),
    }

    md.push_str(&format!(
        "### Repository Statistics\n\
         - **Total Files Analyzed**: {}\n\
         - **Python Files**: {}\n\
         - **JavaScript/TypeScript Files**: {}\n\
         - **Existing Test Files**: {}\n\n",
        m.total_files, m.python_files, m.js_files, m.test_files
    ));
    md.push_str(&format!(
        "### Code Complexity Metrics\n\
         - **Total Functions**: {}\n\
         - **Total Classes**: {}\n\
         - **If/Else Statements**: {}\n\
         - **Loops (for/while)**: {}\n\
         - **Try/Catch Blocks**: {}\n\n",
        m.total_functions, m.total_classes, m.if_statements, m.loops, m.try_catch_blocks
    ));

    md.push_str(&format!(
        "## Test Coverage Plan\n\n\
         ### Functions to Test\n\
         - **Total Functions Found**: {f}\n\
         - **Estimated Test Cases Needed**: {cases} (minimum 2 per function)\n\
         - **Priority**: High complexity functions with multiple logic branches\n\n\
         ### Classes to Test\n\
         - **Total Classes Found**: {c}\n\
         - **Test Strategy**: Unit tests for each class method, integration tests for class interactions\n\n\
         ### Logic Patterns Requiring Tests\n\
         - **Conditional Logic**: {ifs} if/else statements need edge case testing\n\
         - **Loop Logic**: {loops} loops need boundary condition testing\n\
         - **Error Handling**: {tries} try/catch blocks need exception testing\n\n",
        f = m.total_functions,
        cases = m.total_functions * 2,
        c = m.total_classes,
        ifs = m.if_statements,
        loops = m.loops,
        tries = m.try_catch_blocks,
    ));

    md.push_str("## Generated Test Files\n\n### Test Suite Structure\n");
    for name in suite.keys() {
        md.push_str(&format!("- `{name}` - {}\n", describe(name)));
    }
    md.push_str(&format!(
        "\n### Test Categories\n\
         1. **Unit Tests** - Testing individual functions and classes\n\
         2. **Integration Tests** - Testing component interactions\n\
         3. **API Tests** - Testing endpoint functionality\n\
         4. **Database Tests** - Testing data persistence and queries\n\n\
         ### Total Test Cases Generated\n\
         - **Estimated Test Cases**: {}\n\
         - **Coverage Target**: 85%+\n\n",
        suite.len() * 15
    ));

    md.push_str(&format!(
        "## Recommendations\n\n\
         ### High Priority\n\
         1. **Complex Logic Testing**: Focus on functions with {ifs} conditional branches\n\
         2. **Error Path Testing**: Ensure all {tries} error handlers are tested\n\
         3. **Edge Cases**: Test boundary conditions for all {loops} loops\n\n\
         ### Medium Priority\n\
         1. **Integration Testing**: Test interactions between {c} classes\n\
         2. **Performance Testing**: Load test critical paths\n\
         3. **Security Testing**: Validate input sanitization and authentication\n\n",
        ifs = m.if_statements,
        tries = m.try_catch_blocks,
        loops = m.loops,
        c = m.total_classes,
    ));

    md.push_str(
        "## Test Execution Guide\n\n\
         ```bash\n\
         # Install dependencies\n\
         pip install -r requirements-test.txt\n\n\
         # Run all tests\n\
         pytest\n\n\
         # Run with coverage\n\
         pytest --cov=. --cov-report=html\n\
         ```\n\n",
    );
    md.push_str(&format!(
        "---\n\n**Generated**: {} UTC\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    ));
    md
}

fn write_suite(dir: &Path, suite: &FileSet) -> Result<()> {
    for (name, body) in suite {
        atomic_write(&dir.join(name), body.as_bytes())?;
    }
    Ok(())
}

/// Step 5: measure the repository and generate a pytest suite plus report.
pub struct TestingAgent {
    services: Services,
}

impl TestingAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Metrics for `repository`, or empty metrics plus the reason they are empty.
    async fn metrics(&self, repository: Option<&str>) -> (CodeMetrics, Option<String>) {
        let Some(url) = repository else {
            return (CodeMetrics::default(), None);
        };
        let repo = match self.services.checkout(url).await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "testing analysis continuing without repository");
                return (CodeMetrics::default(), Some(e.to_string()));
            }
        };
        match blocking(move || CodeMetrics::analyze(repo.path())).await {
            Ok(m) => (m, None),
            Err(e) => (CodeMetrics::default(), Some(e.to_string())),
        }
    }
}

#[async_trait]
impl StepHandler for TestingAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        let repository = ctx.repository();
        let (metrics, failure) = self.metrics(repository).await;

        let suite = templates::test_suite(&testable_features(&ctx.query));
        let suite_dir: PathBuf = self.services.fresh_dir("test_suite")?;
        {
            let dir = suite_dir.clone();
            let suite = suite.clone();
            blocking(move || write_suite(&dir, &suite)).await??;
        }
        info!(dir = %suite_dir.display(), files = suite.len(), "test suite written");

        let source = match (repository, failure.as_deref()) {
            (None, _) => MetricsSource::NoRepository,
            (Some(_), Some(reason)) => MetricsSource::CloneFailed(reason),
            (Some(url), None) => MetricsSource::Scanned(url),
        };
        let report = render_report(&metrics, &suite, source);

        let file_id = match self.services.save_pdf("testing_report", &report).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "testing PDF generation failed, returning report only");
                None
            }
        };

        Ok(AgentOutput {
            text: report,
            file_id,
            statistics: Some(metrics.to_statistics()),
            repository: repository.map(String::from),
            local_path: Some(suite_dir),
        })
    }
}
