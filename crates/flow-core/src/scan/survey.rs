use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use super::{relative, source_files, SourceKind};
use crate::io::read_lossy;

const MAX_LISTED: usize = 50;

/// Structural overview of a checkout, the raw material for architecture and
/// impact documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoSurvey {
    pub url: String,
    pub project_name: String,
    pub total_files: u64,
    /// Language name to file count.
    pub languages: BTreeMap<String, u64>,
    pub top_level_dirs: Vec<String>,
    pub frontend: Vec<String>,
    pub backend: Vec<String>,
    pub databases: Vec<String>,
    /// `METHOD /path` for route declarations found in code.
    pub endpoints: Vec<String>,
    pub components: Vec<String>,
    pub readme_excerpt: Option<String>,
}

/// `(needle in manifest, technology name)`
const FRONTEND_MARKERS: &[(&str, &str)] = &[
    ("\"react\"", "React"),
    ("\"next\"", "Next.js"),
    ("\"vue\"", "Vue"),
    ("\"@angular/core\"", "Angular"),
    ("\"svelte\"", "Svelte"),
    ("\"vite\"", "Vite"),
    ("\"tailwindcss\"", "Tailwind CSS"),
];

const BACKEND_MARKERS: &[(&str, &str)] = &[
    ("fastapi", "FastAPI"),
    ("flask", "Flask"),
    ("django", "Django"),
    ("\"express\"", "Express"),
    ("\"@nestjs/core\"", "NestJS"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
    ("github.com/gin-gonic/gin", "Gin"),
    ("spring-boot", "Spring Boot"),
];

const DATABASE_MARKERS: &[(&str, &str)] = &[
    ("psycopg", "PostgreSQL"),
    ("postgres", "PostgreSQL"),
    ("\"pg\"", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("sqlite", "SQLite"),
    ("mongo", "MongoDB"),
    ("redis", "Redis"),
    ("sqlalchemy", "SQLAlchemy"),
    ("prisma", "Prisma"),
];

const MANIFESTS: &[&str] = &[
    "package.json",
    "requirements.txt",
    "pyproject.toml",
    "Pipfile",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
];

fn route_patterns() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            // @app.get("/users"), @router.post('/items/{id}')
            Regex::new(r#"@\w+\.(get|post|put|delete|patch)\(\s*["']([^"']+)["']"#).unwrap(),
            // app.get('/users', ...), router.delete("/x")
            Regex::new(r#"\b(?:app|router|server)\.(get|post|put|delete|patch)\(\s*["'`]([^"'`]+)["'`]"#)
                .unwrap(),
        ]
    })
}

fn language_of(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "py" => "Python",
        "js" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "rs" => "Rust",
        "go" => "Go",
        "java" => "Java",
        "kt" => "Kotlin",
        "rb" => "Ruby",
        "php" => "PHP",
        "cs" => "C#",
        "vue" => "Vue",
        "html" => "HTML",
        "css" | "scss" => "CSS",
        "sql" => "SQL",
        _ => return None,
    })
}

fn project_name(url: &str) -> String {
    url.trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("project")
        .to_string()
}

fn push_markers(haystack: &str, markers: &[(&str, &str)], into: &mut BTreeSet<String>) {
    for (needle, name) in markers {
        if haystack.contains(needle) {
            into.insert((*name).to_string());
        }
    }
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

impl RepoSurvey {
    pub fn survey(root: &Path, url: &str) -> Self {
        let mut s = RepoSurvey {
            url: url.to_string(),
            project_name: project_name(url),
            ..RepoSurvey::default()
        };

        let mut frontend = BTreeSet::new();
        let mut backend = BTreeSet::new();
        let mut databases = BTreeSet::new();
        let mut endpoints = BTreeSet::new();
        let mut top = BTreeSet::new();

        for path in source_files(root) {
            s.total_files += 1;
            let rel = relative(root, &path);
            if let Some((first, _)) = rel.split_once('/') {
                top.insert(first.to_string());
            }
            if let Some(lang) = language_of(&path) {
                *s.languages.entry(lang.to_string()).or_default() += 1;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if MANIFESTS.contains(&name.as_str()) {
                if let Ok(text) = read_lossy(&path) {
                    let lower = text.to_lowercase();
                    push_markers(&lower, FRONTEND_MARKERS, &mut frontend);
                    push_markers(&lower, BACKEND_MARKERS, &mut backend);
                    push_markers(&lower, DATABASE_MARKERS, &mut databases);
                }
                continue;
            }

            if s.readme_excerpt.is_none() && name.eq_ignore_ascii_case("README.md") && !rel.contains('/') {
                if let Ok(text) = read_lossy(&path) {
                    let excerpt: String = text
                        .lines()
                        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
                        .take(5)
                        .collect::<Vec<_>>()
                        .join(" ");
                    if !excerpt.is_empty() {
                        s.readme_excerpt = Some(excerpt.chars().take(400).collect());
                    }
                }
                continue;
            }

            let kind = SourceKind::of(&path);
            if kind == SourceKind::Other {
                continue;
            }
            if rel.contains("components/") && (name.ends_with(".jsx") || name.ends_with(".tsx")) {
                if let Some(stem) = path.file_stem() {
                    s.components.push(stem.to_string_lossy().into_owned());
                }
            }
            if endpoints.len() < MAX_LISTED {
                if let Ok(text) = read_lossy(&path) {
                    for re in route_patterns() {
                        for cap in re.captures_iter(&text) {
                            endpoints.insert(format!("{} {}", cap[1].to_uppercase(), &cap[2]));
                        }
                    }
                }
            }
        }

        s.top_level_dirs = top.into_iter().collect();
        s.frontend = frontend.into_iter().collect();
        s.backend = backend.into_iter().collect();
        s.databases = databases.into_iter().collect();
        s.endpoints = endpoints.into_iter().take(MAX_LISTED).collect();
        s.components.truncate(MAX_LISTED);

        info!(
            url,
            files = s.total_files,
            endpoints = s.endpoints.len(),
            components = s.components.len(),
            "repository surveyed"
        );
        s
    }

    /// Coarse architecture style inferred from the detected stack.
    pub fn pattern(&self) -> &'static str {
        match (self.frontend.is_empty(), self.backend.is_empty()) {
            (false, false) => "Client-server (separate frontend and backend)",
            (true, false) => "Service-based API",
            (false, true) => "Single-page application",
            (true, true) => "Unclassified (no recognised framework)",
        }
    }

    pub fn primary_language(&self) -> Option<&str> {
        self.languages
            .iter()
            .max_by_key(|(_, n)| **n)
            .map(|(l, _)| l.as_str())
    }

    /// Markdown outline of the survey. Feeds the LLM and the PDF report.
    pub fn outline(&self, prd: &str) -> String {
        let mut md = format!("# Architecture Analysis: {}\n\n", self.project_name);
        md.push_str(&format!("**Repository:** {}\n\n", self.url));

        md.push_str("## Project Overview\n\n");
        if let Some(readme) = &self.readme_excerpt {
            md.push_str(readme);
            md.push_str("\n\n");
        }
        md.push_str(&format!("- Files analysed: {}\n", self.total_files));
        md.push_str(&format!(
            "- Primary language: {}\n",
            self.primary_language().unwrap_or("unknown")
        ));
        md.push_str(&format!("- Architecture pattern: {}\n\n", self.pattern()));

        md.push_str("## Technology Stack\n\n");
        md.push_str(&format!("- Frontend: {}\n", join_or(&self.frontend, "none detected")));
        md.push_str(&format!("- Backend: {}\n", join_or(&self.backend, "none detected")));
        md.push_str(&format!("- Data stores: {}\n", join_or(&self.databases, "none detected")));
        let langs: Vec<String> = self
            .languages
            .iter()
            .map(|(l, n)| format!("{l} ({n})"))
            .collect();
        md.push_str(&format!("- Languages: {}\n\n", join_or(&langs, "none detected")));

        md.push_str("## Module Layout\n\n");
        for dir in &self.top_level_dirs {
            md.push_str(&format!("- `{dir}/`\n"));
        }
        if self.top_level_dirs.is_empty() {
            md.push_str("- (flat layout)\n");
        }

        md.push_str(&format!("\n## Endpoints ({})\n\n", self.endpoints.len()));
        for ep in self.endpoints.iter().take(15) {
            md.push_str(&format!("- `{ep}`\n"));
        }

        md.push_str(&format!("\n## UI Components ({})\n\n", self.components.len()));
        for c in self.components.iter().take(15) {
            md.push_str(&format!("- {c}\n"));
        }

        if !prd.trim().is_empty() {
            md.push_str("\n## Requirements Context\n\n");
            md.push_str(&prd.chars().take(1500).collect::<String>());
            md.push('\n');
        }
        md
    }

    /// Minimal architecture document used when the LLM is unavailable.
    pub fn static_markdown(&self) -> String {
        let date = chrono::Utc::now().format("%Y-%m-%d");
        format!(
            "# System Architecture Document: {name}\n\n\
             **Version:** 1.0.0\n**Date:** {date}\n**Repository:** {url}\n\n\
             ## Executive Summary\n{summary}\n\n\
             ## Architecture Overview\n\
             - **Pattern**: {pattern}\n\
             - **Frontend**: {frontend}\n\
             - **Backend**: {backend}\n\
             - **Data stores**: {db}\n\
             - **Endpoints**: {endpoints}\n",
            name = self.project_name,
            url = self.url,
            summary = self
                .readme_excerpt
                .as_deref()
                .unwrap_or("No description available."),
            pattern = self.pattern(),
            frontend = join_or(&self.frontend, "none detected"),
            backend = join_or(&self.backend, "none detected"),
            db = join_or(&self.databases, "none detected"),
            endpoints = self.endpoints.len(),
        )
    }
}
