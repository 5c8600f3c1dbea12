//! Boilerplate source files written by the coding and testing steps.
//!
//! Templates are embedded at build time. `{{features}}`, `{{features_list}}`
//! and `{{timestamp}}` are substituted on render.

use rust_embed::Embed;
use std::collections::BTreeMap;

#[derive(Embed)]
#[folder = "templates/"]
struct TemplateFiles;

/// Relative path to file body.
pub type FileSet = BTreeMap<String, String>;

/// Files every generated backend starts from, keyed `backend/...`.
pub fn backend(features: &[String]) -> FileSet {
    let mut files = render_dir("backend/", "backend/", features);
    files.remove("backend/env.example");
    files
}

/// Frontend scaffold, keyed `frontend/...`.
pub fn frontend(features: &[String]) -> FileSet {
    render_dir("frontend/", "frontend/", features)
}

/// Pytest suite, keyed by bare filename (`test_main.py`, `conftest.py`, ...).
pub fn test_suite(features: &[String]) -> FileSet {
    render_dir("tests/", "", features)
}

/// Contents of `.env.example` for a generated backend.
pub fn env_example() -> String {
    raw("backend/env.example").unwrap_or_default()
}

fn raw(path: &str) -> Option<String> {
    <TemplateFiles as Embed>::get(path).map(|f| String::from_utf8_lossy(&f.data).into_owned())
}

fn render_dir(prefix: &str, key_prefix: &str, features: &[String]) -> FileSet {
    TemplateFiles::iter()
        .filter(|p| p.starts_with(prefix))
        .filter_map(|p| {
            let body = raw(&p)?;
            let key = format!("{key_prefix}{}", &p[prefix.len()..]);
            Some((key, render(&body, features)))
        })
        .collect()
}

/// Substitute the template placeholders.
pub fn render(body: &str, features: &[String]) -> String {
    let quoted: Vec<String> = features
        .iter()
        .map(|f| format!("\"{}\"", f.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    let list: Vec<String> = features.iter().map(|f| format!("- {f}")).collect();
    body.replace("{{features}}", &format!("[{}]", quoted.join(", ")))
        .replace("{{features_list}}", &list.join("\n"))
        .replace(
            "{{timestamp}}",
            &chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
}
