use async_trait::async_trait;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::{blocking, truncate, Services, StepHandler};
use crate::error::Result;
use crate::io::{atomic_write, ensure_dir};
use crate::templates::{self, FileSet};
use crate::types::{AgentOutput, StepContext};

const SYSTEM_PROMPT: &str = "You are Agent-4: Principal Backend Engineer & API Architect.
Generate a production-grade FastAPI backend in a flat, service-oriented layout:

backend/
  main.py               FastAPI app, CORS, logging, routes
  config.py             settings loaded with python-dotenv
  requirements.txt
  models/schemas.py     Pydantic v2 models
  services/*.py         all business logic
  utils/helpers.py

Keep logic out of routes. Generate FULL FILE CONTENTS.";

const FEATURE_KEYWORDS: &[&str] = &[
    "feature",
    "requirement",
    "user",
    "login",
    "register",
    "auth",
    "create",
    "manage",
    "dashboard",
    "search",
    "upload",
    "report",
    "notification",
    "payment",
    "endpoint",
    "should",
    "must",
    "allow",
];

const DEFAULT_FEATURES: &[&str] = &[
    "User authentication and authorization",
    "CRUD operations for core entities",
    "RESTful API endpoints",
    "Data validation and error handling",
    "Database integration",
];

const MAX_FEATURES: usize = 10;

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-\u{2022}*]\s*").unwrap())
}

fn code_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n(.*?)\n```").unwrap())
}

/// Requirement-like lines from `text`: lowercased, label and bullet stripped,
/// longer than 10 and shorter than 120 characters, first letter capitalised,
/// deduplicated, at most ten. Falls back to a generic feature list.
pub fn extract_features(text: &str) -> Vec<String> {
    let mut features: Vec<String> = Vec::new();
    for line in text.to_lowercase().lines() {
        if !FEATURE_KEYWORDS.iter().any(|k| line.contains(k)) {
            continue;
        }
        let cleaned = line.replace("feature:", "").replace("requirement:", "");
        let cleaned = bullet_re().replace(cleaned.trim(), "").trim().to_string();
        let len = cleaned.chars().count();
        if len <= 10 || len >= 120 {
            continue;
        }
        let feature = capitalize(&cleaned);
        if !features.contains(&feature) {
            features.push(feature);
        }
        if features.len() == MAX_FEATURES {
            break;
        }
    }
    if features.is_empty() {
        return DEFAULT_FEATURES.iter().map(|f| f.to_string()).collect();
    }
    features
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Overlay the files named in an LLM reply onto `files`.
///
/// The reply is expected as `--- File: <path>` headers each followed by the
/// file body; code fences inside bodies are dropped. If no header is present,
/// fenced code blocks are assigned in order to the existing keys instead.
pub fn apply_reply(files: &mut FileSet, reply: &str) {
    let sections: Vec<&str> = reply.split("--- File: ").collect();
    if sections.len() < 2 {
        let keys: Vec<String> = files.keys().cloned().collect();
        let blocks = code_block_re().captures_iter(reply).filter_map(|c| c.get(1));
        for (key, block) in keys.into_iter().zip(blocks) {
            files.insert(key, block.as_str().trim().to_string());
        }
        return;
    }

    for section in &sections[1..] {
        let Some((name, body)) = section.split_once('\n') else {
            continue;
        };
        let name = name.trim();
        if !is_safe_relative(name) {
            warn!(path = name, "ignoring generated file with unsafe path");
            continue;
        }
        let body = strip_fences(body);
        files.insert(name.to_string(), body);
    }
}

/// Remove fence lines (```lang / ```) from a file body.
fn strip_fences(body: &str) -> String {
    body.lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Relative, non-empty, and never escaping the workspace.
fn is_safe_relative(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Write `files` under `root` and add the `tests/`, `docs/` and `.env.example` scaffolding.
pub fn write_workspace(root: &Path, files: &FileSet) -> Result<()> {
    for (rel, body) in files {
        atomic_write(&root.join(rel), body.as_bytes())?;
    }
    ensure_dir(&root.join("tests"))?;
    ensure_dir(&root.join("docs"))?;
    atomic_write(&root.join(".env.example"), templates::env_example().as_bytes())?;
    debug!(root = %root.display(), files = files.len(), "workspace written");
    Ok(())
}

/// Step 4: generate backend and frontend source from the architecture context.
pub struct CodingAgent {
    services: Services,
}

impl CodingAgent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn user_prompt(context: &str, features: &[String]) -> String {
        let list: Vec<String> = features.iter().map(|f| format!("- {f}")).collect();
        format!(
            "Generate a FastAPI backend following the service-oriented layout.\n\n\
             PRD REQUIREMENTS:\n{prd}\n\n\
             KEY FEATURES:\n{features}\n\n\
             REQUIRED FILES:\n\
             1. backend/main.py\n\
             2. backend/config.py\n\
             3. backend/models/schemas.py\n\
             4. backend/services/business_service.py\n\
             5. backend/utils/helpers.py\n\
             6. backend/requirements.txt\n\n\
             Output Format:\n--- File: <filename>\n<code content>\n",
            prd = truncate(context, 1500),
            features = list.join("\n"),
        )
    }
}

#[async_trait]
impl StepHandler for CodingAgent {
    async fn produce(&self, ctx: &StepContext) -> Result<AgentOutput> {
        let features = extract_features(&ctx.query);
        info!(features = features.len(), "generating backend code");

        let mut files = templates::backend(&features);
        match self
            .services
            .ask(SYSTEM_PROMPT, &Self::user_prompt(&ctx.query, &features))
            .await
        {
            Ok(reply) => apply_reply(&mut files, &reply),
            Err(e) => warn!(error = %e, "code generation LLM call failed, using templates only"),
        }
        files.extend(templates::frontend(&features));

        let root = self.services.fresh_dir("generated_backend")?;
        let file_count = files.len();
        let dir = root.clone();
        blocking(move || write_workspace(&dir, &files)).await??;
        info!(root = %root.display(), files = file_count, "generated code written");

        let repository = ctx.repository().map(String::from);
        let text = format!(
            "Full-stack code (Backend & Frontend) generated and pushed to repository.\n\n\
             GitHub: {}\nLocal Workspace: {}",
            repository.as_deref().unwrap_or("None"),
            root.display()
        );
        Ok(AgentOutput {
            text,
            repository,
            local_path: Some(PathBuf::from(&root)),
            ..AgentOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services_in, services_with, CannedLlm};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn features_are_cleaned_and_deduplicated() {
        let prd = "# Todo\n- Feature: users can create tasks with due dates\n* Users can create tasks with due dates\n\u{2022} requirement: search tasks by keyword quickly\nunrelated line\n- user";
        let features = extract_features(prd);
        assert_eq!(
            features,
            vec![
                "Users can create tasks with due dates".to_string(),
                "Search tasks by keyword quickly".to_string(),
            ]
        );
    }

    #[test]
    fn features_capped_at_ten() {
        let prd: String = (0..20)
            .map(|i| format!("- The user must manage item number {i}\n"))
            .collect();
        assert_eq!(extract_features(&prd).len(), 10);
    }

    #[test]
    fn features_default_when_nothing_matches() {
        assert_eq!(extract_features("hello world").len(), DEFAULT_FEATURES.len());
    }

    #[test]
    fn reply_files_override_templates() {
        let mut files = templates::backend(&["x".to_string()]);
        let reply = "Sure!\n--- File: backend/main.py\n```python\nprint('generated')\n```\n--- File: backend/services/todo_service.py\nclass TodoService:\n    pass\n";
        apply_reply(&mut files, reply);
        assert_eq!(files["backend/main.py"], "print('generated')");
        assert_eq!(files["backend/services/todo_service.py"], "class TodoService:\n    pass");
        assert!(files.contains_key("backend/config.py"));
    }

    #[test]
    fn code_blocks_fill_templates_in_order_without_headers() {
        let mut files = FileSet::new();
        files.insert("a.py".into(), "A".into());
        files.insert("b.py".into(), "B".into());
        files.insert("c.py".into(), "C".into());
        apply_reply(&mut files, "```python\none\n```\ntext\n```\ntwo\n```");
        assert_eq!(files["a.py"], "one");
        assert_eq!(files["b.py"], "two");
        assert_eq!(files["c.py"], "C");
    }

    #[test]
    fn unsafe_paths_are_ignored() {
        let mut files = FileSet::new();
        apply_reply(&mut files, "--- File: ../escape.py\nx\n--- File: /etc/passwd\ny\n");
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn produce_writes_workspace_and_names_it() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(CannedLlm::new("--- File: backend/main.py\nprint('hi')\n"));
        let agent = CodingAgent::new(services_with(dir.path(), llm.clone()));

        let ctx = StepContext::new("# Architecture\n- Users can register and login securely")
            .with_repository("https://github.com/x/y");
        let out = agent.produce(&ctx).await.unwrap();

        let root = out.local_path.unwrap();
        assert!(root.file_name().unwrap().to_string_lossy().starts_with("generated_backend_"));
        assert!(out.text.contains("https://github.com/x/y"));
        assert!(out.text.contains(&root.display().to_string()));
        assert_eq!(
            std::fs::read_to_string(root.join("backend/main.py")).unwrap(),
            "print('hi')"
        );
        assert!(root.join("frontend/src/App.tsx").is_file());
        assert!(root.join(".env.example").is_file());
        assert!(root.join("tests").is_dir());
        assert!(root.join("docs").is_dir());
        assert!(llm.calls()[0].1.contains("- Users can register and login securely"));
    }

    #[tokio::test]
    async fn concurrent_runs_get_separate_workspaces() {
        let dir = TempDir::new().unwrap();
        let a = CodingAgent::new(services_in(dir.path(), CannedLlm::new("--- File: a_only.py\na\n")));
        let b = CodingAgent::new(services_in(dir.path(), CannedLlm::new("--- File: b_only.py\nb\n")));
        let ctx = StepContext::new("# Architecture");

        let (out_a, out_b) = tokio::join!(a.produce(&ctx), b.produce(&ctx));
        let root_a = out_a.unwrap().local_path.unwrap();
        let root_b = out_b.unwrap().local_path.unwrap();

        assert_ne!(root_a, root_b);
        assert!(root_a.join("a_only.py").is_file());
        assert!(!root_a.join("b_only.py").exists());
        assert!(!root_b.join("a_only.py").exists());
    }

    #[tokio::test]
    async fn llm_failure_still_writes_templates() {
        let dir = TempDir::new().unwrap();
        let agent = CodingAgent::new(services_in(dir.path(), CannedLlm::failing()));
        let out = agent.produce(&StepContext::new("")).await.unwrap();
        let root = out.local_path.unwrap();
        assert!(root.join("backend/main.py").is_file());
        assert!(out.text.contains("GitHub: None"));
    }
}
