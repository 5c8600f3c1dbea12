use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{FlowError, Result};

/// A checked-out repository. The working tree is deleted on drop.
#[derive(Debug)]
pub struct ClonedRepo {
    dir: TempDir,
    url: String,
}

impl ClonedRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Clone `url` into a fresh temp dir: shallow first, full clone if that fails.
/// Each attempt is bounded by `timeout`.
pub async fn clone_repository(url: &str, timeout: Duration) -> Result<ClonedRepo> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FlowError::Clone("no repository URL given".to_string()));
    }
    let git = which::which("git")
        .map_err(|_| FlowError::Clone("git executable not found on PATH".to_string()))?;

    let shallow = TempDir::new()?;
    match run_clone(&git, url, shallow.path(), true, timeout).await {
        Ok(()) => {
            info!(url, "repository cloned (shallow)");
            return Ok(ClonedRepo {
                dir: shallow,
                url: url.to_string(),
            });
        }
        Err(e) => warn!(url, error = %e, "shallow clone failed, retrying full clone"),
    }

    let full = TempDir::new()?;
    run_clone(&git, url, full.path(), false, timeout).await?;
    info!(url, "repository cloned");
    Ok(ClonedRepo {
        dir: full,
        url: url.to_string(),
    })
}

async fn run_clone(
    git: &Path,
    url: &str,
    dest: &Path,
    shallow: bool,
    timeout: Duration,
) -> Result<()> {
    let mut cmd = Command::new(git);
    cmd.arg("clone");
    if shallow {
        cmd.args(["--depth", "1"]);
    }
    cmd.arg(url)
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| FlowError::Clone(format!("timed out after {}s", timeout.as_secs())))??;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(FlowError::Clone(
            stderr.lines().last().unwrap_or("git clone failed").trim().to_string(),
        ))
    }
}
