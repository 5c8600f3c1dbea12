//! Test doubles for the LLM and the repository host.
//!
//! Compiled for this crate's tests and, with the `test-utils` feature, for
//! downstream crates' tests.

use async_trait::async_trait;
use llm_gateway::{LlmError, TextGenerator};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::agents::Services;
use crate::artifact::ArtifactRegistry;
use crate::cache::AnalysisCache;
use crate::push::{PushError, RepositoryHost};

// ---------------------------------------------------------------------------
// CannedLlm
// ---------------------------------------------------------------------------

/// Replies from a script, then repeats a fallback reply. `None` entries fail.
#[derive(Default)]
pub struct CannedLlm {
    script: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl CannedLlm {
    /// Always answer `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Always fail.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Answer from `script` in order; once it runs out, behave like `fallback`.
    pub fn scripted(script: Vec<Option<&str>>, fallback: Option<&str>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|r| r.map(String::from)).collect()),
            fallback: fallback.map(String::from),
            calls: Mutex::default(),
        }
    }

    /// `(system_prompt, user_prompt)` for every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl TextGenerator for CannedLlm {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> llm_gateway::Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system_prompt.to_string(), user_prompt.to_string()));
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let reply = match next {
            Some(scripted) => scripted,
            None => self.fallback.clone(),
        };
        reply.ok_or_else(|| LlmError::Exhausted(vec!["canned: scripted failure".to_string()]))
    }
}

/// Services writing into `dir`, backed by `llm`.
pub fn services_in(dir: &Path, llm: CannedLlm) -> Services {
    services_with(dir, Arc::new(llm))
}

/// Like [`services_in`] but keeps a handle on the LLM for assertions.
pub fn services_with(dir: &Path, llm: Arc<CannedLlm>) -> Services {
    Services {
        llm,
        registry: Arc::new(ArtifactRegistry::new()),
        cache: Arc::new(AnalysisCache::new(4)),
        output_dir: dir.to_path_buf(),
        clone_timeout: Duration::from_secs(5),
    }
}

// ---------------------------------------------------------------------------
// RecordingHost
// ---------------------------------------------------------------------------

/// One call made against a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    SetToken(String),
    Create { name: String, description: String },
    PushFile { repo: String, path: String },
    PushDirectory { repo: String },
}

/// Records every call. Pushes fail when built with [`RecordingHost::failing`].
#[derive(Default)]
pub struct RecordingHost {
    created_url: Option<String>,
    fail_pushes: bool,
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    /// A host with no credential: creation yields `None`, pushes succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation returns `url`.
    pub fn creating(url: impl Into<String>) -> Self {
        Self {
            created_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Every push fails with an API error.
    pub fn failing() -> Self {
        Self {
            fail_pushes: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn pushed_paths(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::PushFile { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    fn outcome(&self) -> Result<(), PushError> {
        if self.fail_pushes {
            Err(PushError::Api {
                status: 503,
                body: "host unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RepositoryHost for RecordingHost {
    fn set_token(&self, token: &str) {
        self.record(HostCall::SetToken(token.to_string()));
    }

    async fn create_repository(&self, name: &str, description: &str) -> Option<String> {
        self.record(HostCall::Create {
            name: name.to_string(),
            description: description.to_string(),
        });
        self.created_url.clone()
    }

    async fn push_file(
        &self,
        repo_url: &str,
        target_path: &str,
        _bytes: &[u8],
        _message: &str,
    ) -> Result<(), PushError> {
        self.record(HostCall::PushFile {
            repo: repo_url.to_string(),
            path: target_path.to_string(),
        });
        self.outcome()
    }

    async fn push_directory(
        &self,
        repo_url: &str,
        _dir: &Path,
    ) -> Result<BTreeMap<String, String>, PushError> {
        self.record(HostCall::PushDirectory {
            repo: repo_url.to_string(),
        });
        self.outcome()?;
        Ok(BTreeMap::from([("backend/main.py".to_string(), "pushed".to_string())]))
    }
}
