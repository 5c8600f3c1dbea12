use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::{source_files, SourceKind};
use crate::io::read_lossy;
use crate::types::Statistics;

/// Approximate structural counts for a source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeMetrics {
    pub total_files: u64,
    pub python_files: u64,
    pub js_files: u64,
    pub total_functions: u64,
    pub total_classes: u64,
    pub if_statements: u64,
    pub loops: u64,
    pub try_catch_blocks: u64,
    pub test_files: u64,
}

struct Patterns {
    functions: Regex,
    classes: Regex,
    ifs: Regex,
    loops: Regex,
    tries: Regex,
}

fn python() -> &'static Patterns {
    static RE: OnceLock<Patterns> = OnceLock::new();
    RE.get_or_init(|| Patterns {
        functions: Regex::new(r"\bdef\s+\w+").unwrap(),
        classes: Regex::new(r"\bclass\s+\w+").unwrap(),
        ifs: Regex::new(r"\bif\s+").unwrap(),
        loops: Regex::new(r"\b(for|while)\s+").unwrap(),
        tries: Regex::new(r"\btry\s*:").unwrap(),
    })
}

fn script() -> &'static Patterns {
    static RE: OnceLock<Patterns> = OnceLock::new();
    RE.get_or_init(|| Patterns {
        functions: Regex::new(r"function\s+\w+|const\s+\w+\s*=\s*\(|\w+\s*:\s*\(").unwrap(),
        classes: Regex::new(r"\bclass\s+\w+").unwrap(),
        ifs: Regex::new(r"\bif\s*\(").unwrap(),
        loops: Regex::new(r"\b(for|while)\s*\(").unwrap(),
        tries: Regex::new(r"\btry\s*\{").unwrap(),
    })
}

fn count(re: &Regex, text: &str) -> u64 {
    re.find_iter(text).count() as u64
}

fn is_test_file(kind: SourceKind, name: &str) -> bool {
    match kind {
        SourceKind::Python => name.contains("test_") || name.contains("_test"),
        SourceKind::Script => name.contains("test") || name.contains("spec"),
        SourceKind::Other => false,
    }
}

impl CodeMetrics {
    /// Walk `root` and count files, functions, classes and control flow.
    pub fn analyze(root: &Path) -> Self {
        let mut m = CodeMetrics::default();

        for path in source_files(root) {
            m.total_files += 1;
            let kind = SourceKind::of(&path);
            let patterns = match kind {
                SourceKind::Python => {
                    m.python_files += 1;
                    python()
                }
                SourceKind::Script => {
                    m.js_files += 1;
                    script()
                }
                SourceKind::Other => continue,
            };

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if is_test_file(kind, &name) {
                m.test_files += 1;
            }

            let text = match read_lossy(&path) {
                Ok(t) => t,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            m.total_functions += count(&patterns.functions, &text);
            m.total_classes += count(&patterns.classes, &text);
            m.if_statements += count(&patterns.ifs, &text);
            m.loops += count(&patterns.loops, &text);
            m.try_catch_blocks += count(&patterns.tries, &text);
        }

        info!(
            files = m.total_files,
            functions = m.total_functions,
            classes = m.total_classes,
            "code metrics collected"
        );
        m
    }

    /// The counters reported by the testing step.
    pub fn to_statistics(&self) -> Statistics {
        [
            ("total_files", self.total_files),
            ("total_functions", self.total_functions),
            ("total_classes", self.total_classes),
            ("if_statements", self.if_statements),
            ("loops", self.loops),
            ("try_catch_blocks", self.try_catch_blocks),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
