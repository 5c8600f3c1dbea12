//! Publishing step artifacts to a hosted repository.
//!
//! Pushing is best-effort from the workflow's point of view: callers log and
//! record a [`PushError`] but never fail a step because of one.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ignore::WalkBuilder;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("sdlc-flow/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum PushError {
    #[error("no GitHub token configured")]
    NoToken,

    #[error("not a GitHub repository URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("GitHub request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PushError {
    /// Errors that will fail every subsequent push to the same repository too.
    fn is_fatal(&self) -> bool {
        matches!(self, PushError::NoToken | PushError::InvalidUrl(_))
    }
}

// ---------------------------------------------------------------------------
// RepositoryHost
// ---------------------------------------------------------------------------

/// Where steps publish what they produce.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Replace the credential used for subsequent calls.
    fn set_token(&self, token: &str);

    /// Create a public repository and return its browser URL, or `None` when
    /// there is no credential or the host refuses.
    async fn create_repository(&self, name: &str, description: &str) -> Option<String>;

    /// Create or update one file.
    async fn push_file(
        &self,
        repo_url: &str,
        target_path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<(), PushError>;

    /// Push each `key -> markdown` pair to `docs/{key}.md`.
    async fn push_markdown(
        &self,
        repo_url: &str,
        outputs: &BTreeMap<String, String>,
    ) -> Result<(), PushError> {
        for (key, body) in outputs {
            let target = format!("docs/{key}.md");
            self.push_file(repo_url, &target, body.as_bytes(), &format!("Update {key}"))
                .await?;
        }
        Ok(())
    }

    /// Push every file under `dir`, keyed by relative path. Per-file failures
    /// are recorded in the returned map; missing credentials abort the walk.
    async fn push_directory(
        &self,
        repo_url: &str,
        dir: &Path,
    ) -> Result<BTreeMap<String, String>, PushError> {
        let mut statuses = BTreeMap::new();
        for (rel, path) in local_files(dir) {
            let bytes = tokio::fs::read(&path).await?;
            match self
                .push_file(repo_url, &rel, &bytes, &format!("Add {rel}"))
                .await
            {
                Ok(()) => {
                    statuses.insert(rel, "pushed".to_string());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(file = %rel, error = %e, "file push failed");
                    statuses.insert(rel, format!("failed: {e}"));
                }
            }
        }
        info!(repo = repo_url, files = statuses.len(), "directory pushed");
        Ok(statuses)
    }
}

/// Files under `dir` (dotfiles included, `.git` excluded) as `(relative path, absolute path)`.
fn local_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files: Vec<(String, PathBuf)> = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .git_exclude(false)
        .git_global(false)
        .ignore(false)
        .parents(false)
        .filter_entry(|e| e.file_name() != ".git")
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(dir)
                .unwrap_or(e.path())
                .to_string_lossy()
                .replace('\\', "/");
            (rel, e.into_path())
        })
        .collect();
    files.sort();
    files
}

/// `(owner, repo)` from `https://github.com/owner/repo[.git]`, `git@github.com:owner/repo.git`
/// or a bare `owner/repo`.
pub fn parse_repo_url(url: &str) -> Result<(String, String), PushError> {
    let trimmed = url.trim().trim_end_matches('/');
    let tail = match trimmed.find("github.com") {
        Some(idx) => &trimmed[idx + "github.com".len()..],
        None if !trimmed.contains("://") => trimmed,
        None => return Err(PushError::InvalidUrl(url.to_string())),
    };
    let mut parts = tail
        .trim_start_matches([':', '/'])
        .split('/')
        .filter(|s| !s.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.is_empty() {
                return Err(PushError::InvalidUrl(url.to_string()));
            }
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(PushError::InvalidUrl(url.to_string())),
    }
}

// ---------------------------------------------------------------------------
// GitHubHost
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreatedRepo {
    html_url: String,
}

#[derive(Deserialize)]
struct ContentEntry {
    sha: String,
}

/// GitHub over the REST contents API.
pub struct GitHubHost {
    client: reqwest::Client,
    api_base: String,
    token: RwLock<Option<String>>,
}

impl GitHubHost {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn token(&self) -> Result<String, PushError> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(PushError::NoToken)
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> String {
        format!(
            "{}/repos/{owner}/{repo}/contents/{}",
            self.api_base,
            path.trim_start_matches('/')
        )
    }

    /// Blob sha of an existing file, needed to update it in place.
    async fn existing_sha(&self, url: &str, token: &str) -> Result<Option<String>, PushError> {
        let resp = self
            .request(reqwest::Method::GET, url, token)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let entry: ContentEntry = resp
            .json()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(Some(entry.sha))
    }
}

async fn api_error(resp: reqwest::Response) -> PushError {
    PushError::Api {
        status: resp.status().as_u16(),
        body: resp.text().await.unwrap_or_default(),
    }
}

#[async_trait]
impl RepositoryHost for GitHubHost {
    fn set_token(&self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        debug!("GitHub token updated");
    }

    async fn create_repository(&self, name: &str, description: &str) -> Option<String> {
        let Ok(token) = self.token() else {
            info!(name, "no GitHub token, skipping repository creation");
            return None;
        };
        let url = format!("{}/user/repos", self.api_base);
        let body = json!({
            "name": name,
            "description": description,
            "private": false,
            "auto_init": true,
        });
        let resp = match self
            .request(reqwest::Method::POST, &url, &token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(name, error = %e, "repository creation request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            let err = api_error(resp).await;
            warn!(name, error = %err, "repository creation rejected");
            return None;
        }
        match resp.json::<CreatedRepo>().await {
            Ok(created) => {
                info!(url = %created.html_url, "repository created");
                Some(created.html_url)
            }
            Err(e) => {
                warn!(name, error = %e, "unexpected repository creation response");
                None
            }
        }
    }

    async fn push_file(
        &self,
        repo_url: &str,
        target_path: &str,
        bytes: &[u8],
        message: &str,
    ) -> Result<(), PushError> {
        let token = self.token()?;
        let (owner, repo) = parse_repo_url(repo_url)?;
        let url = self.contents_url(&owner, &repo, target_path);

        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(bytes),
        });
        if let Some(sha) = self.existing_sha(&url, &token).await? {
            body["sha"] = json!(sha);
        }

        let resp = self
            .request(reqwest::Method::PUT, &url, &token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        debug!(%owner, %repo, path = target_path, "file pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tempfile::TempDir;

    #[test]
    fn parses_repository_urls() {
        for url in [
            "https://github.com/acme/shop",
            "https://github.com/acme/shop.git",
            "https://github.com/acme/shop/",
            "git@github.com:acme/shop.git",
            "acme/shop",
        ] {
            assert_eq!(
                parse_repo_url(url).unwrap(),
                ("acme".to_string(), "shop".to_string()),
                "{url}"
            );
        }
    }

    #[test]
    fn rejects_non_repository_urls() {
        for url in ["", "https://gitlab.com/a/b", "https://github.com/acme", "shop"] {
            assert!(
                matches!(parse_repo_url(url), Err(PushError::InvalidUrl(_))),
                "{url}"
            );
        }
    }

    #[tokio::test]
    async fn create_repository_without_token_is_none() {
        let host = GitHubHost::new("http://127.0.0.1:9", None);
        assert!(host.create_repository("x", "y").await.is_none());
    }

    #[tokio::test]
    async fn create_repository_returns_html_url() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/user/repos")
            .match_header("authorization", "Bearer t0k")
            .match_body(Matcher::PartialJson(json!({"name": "sdlc-project-1"})))
            .with_status(201)
            .with_body(r#"{"html_url": "https://github.com/me/sdlc-project-1"}"#)
            .create_async()
            .await;

        let host = GitHubHost::new(server.url(), None);
        host.set_token("t0k");
        let url = host.create_repository("sdlc-project-1", "AI-Generated SDLC Project").await;
        assert_eq!(url.as_deref(), Some("https://github.com/me/sdlc-project-1"));
    }

    #[tokio::test]
    async fn create_repository_rejected_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/user/repos")
            .with_status(422)
            .with_body(r#"{"message": "name already exists"}"#)
            .create_async()
            .await;
        let host = GitHubHost::new(server.url(), Some("t".into()));
        assert!(host.create_repository("dup", "d").await.is_none());
    }

    #[tokio::test]
    async fn push_file_without_token_fails() {
        let host = GitHubHost::new("http://127.0.0.1:9", None);
        let err = host
            .push_file("https://github.com/a/b", "x.md", b"x", "m")
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::NoToken));
    }

    #[tokio::test]
    async fn push_file_updates_existing_with_sha() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/repos/acme/shop/contents/docs/code_review.md")
            .with_status(200)
            .with_body(r#"{"sha": "abc123"}"#)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/repos/acme/shop/contents/docs/code_review.md")
            .match_body(Matcher::PartialJson(json!({
                "sha": "abc123",
                "content": STANDARD.encode("# Review"),
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let host = GitHubHost::new(server.url(), Some("t".into()));
        let mut outputs = BTreeMap::new();
        outputs.insert("code_review".to_string(), "# Review".to_string());
        host.push_markdown("https://github.com/acme/shop", &outputs)
            .await
            .unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn push_file_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/repos/acme/shop/contents/a.txt")
            .with_status(404)
            .create_async()
            .await;
        let _put = server
            .mock("PUT", "/repos/acme/shop/contents/a.txt")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let host = GitHubHost::new(server.url(), Some("t".into()));
        let err = host
            .push_file("https://github.com/acme/shop", "a.txt", b"a", "m")
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn push_directory_reports_each_file() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", Matcher::Regex(r"^/repos/acme/shop/contents/.*".into()))
            .with_status(404)
            .create_async()
            .await;
        let _put_ok = server
            .mock("PUT", "/repos/acme/shop/contents/backend/main.py")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let _put_env = server
            .mock("PUT", "/repos/acme/shop/contents/.env.example")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let _put_bad = server
            .mock("PUT", "/repos/acme/shop/contents/docs/README.md")
            .with_status(500)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("backend")).unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("backend/main.py"), "print('hi')").unwrap();
        std::fs::write(dir.path().join("docs/README.md"), "# docs").unwrap();
        std::fs::write(dir.path().join(".env.example"), "A=1").unwrap();

        let host = GitHubHost::new(server.url(), Some("t".into()));
        let statuses = host
            .push_directory("https://github.com/acme/shop", dir.path())
            .await
            .unwrap();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses["backend/main.py"], "pushed");
        assert_eq!(statuses[".env.example"], "pushed");
        assert!(statuses["docs/README.md"].starts_with("failed"));
    }

    #[tokio::test]
    async fn push_directory_without_token_aborts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let host = GitHubHost::new("http://127.0.0.1:9", None);
        let err = host
            .push_directory("https://github.com/a/b", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::NoToken));
    }
}
