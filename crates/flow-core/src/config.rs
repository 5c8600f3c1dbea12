use llm_gateway::{ProviderConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::paths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Tried in order; the first one that answers wins.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Unit for rate-limit waits. A 429 on attempt `n` waits `10 + 15n + U(0,5)` units.
    #[serde(default = "default_backoff_secs")]
    pub rate_limit_backoff_secs: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig::groq()]
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_secs() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            max_retries: default_max_retries(),
            rate_limit_backoff_secs: default_backoff_secs(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitConfig / GitHubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
}

fn default_clone_timeout() -> u64 {
    60
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            clone_timeout_secs: default_clone_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the default push token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig / CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where reports and generated code land. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub architecture_capacity: usize,
}

fn default_cache_capacity() -> usize {
    32
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            architecture_capacity: default_cache_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Which config file would be read: `explicit`, then `$SDLC_FLOW_CONFIG`,
    /// then `./.sdlc-flow/config.yaml`, then `~/.sdlc-flow/config.yaml`.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Some(p) = std::env::var_os(paths::CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(p));
        }
        let local = std::env::current_dir()
            .ok()
            .map(|cwd| paths::config_path_in(&cwd))
            .filter(|p| p.is_file());
        local.or_else(|| paths::user_config_path().filter(|p| p.is_file()))
    }

    /// Load from the located file (or defaults) and apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match Self::locate(explicit) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                let data = std::fs::read_to_string(&path)?;
                Self::from_yaml(&data)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply `GROQ_*` and `GIT_CLONE_TIMEOUT` overrides. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(groq) = self.llm.providers.iter_mut().find(|p| p.name == "groq") {
            if let Some(v) = var("GROQ_URL") {
                groq.base_url = v;
            }
            if let Some(v) = var("GROQ_MODEL") {
                groq.model = v;
            }
            if let Some(v) = var("GROQ_TEMPERATURE").and_then(|v| v.parse().ok()) {
                groq.temperature = v;
            }
            if let Some(v) = var("GROQ_MAX_TOKENS").and_then(|v| v.parse().ok()) {
                groq.max_tokens = v;
            }
            if let Some(v) = var("GROQ_API_KEY") {
                groq.api_key = Some(v);
            }
        }

        if let Some(v) = var("GIT_CLONE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.git.clone_timeout_secs = v;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.llm.max_retries,
            backoff_base: Duration::from_secs_f64(self.llm.rate_limit_backoff_secs.max(0.0)),
            timeout: Duration::from_secs(self.llm.request_timeout_secs),
        }
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.git.clone_timeout_secs)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.storage
            .output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.github.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = Config::from_yaml("").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.llm.max_retries, 3);
        assert_eq!(cfg.git.clone_timeout_secs, 60);
        assert_eq!(cfg.cache.architecture_capacity, 32);
        assert_eq!(cfg.llm.providers.len(), 1);
        assert_eq!(cfg.llm.providers[0].name, "groq");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let cfg = Config::from_yaml("server:\n  port: 9001\ngit:\n  clone_timeout_secs: 5\n").unwrap();
        assert_eq!(cfg.server.port, 9001);
        assert_eq!(cfg.git.clone_timeout_secs, 5);
        assert_eq!(cfg.github.api_base, "https://api.github.com");
    }

    #[test]
    fn providers_from_yaml() {
        let yaml = r#"
llm:
  providers:
    - name: local
      base_url: http://localhost:11434/v1/chat/completions
      model: llama3
      api_key: dummy
    - name: groq
      base_url: https://api.groq.com/openai/v1/chat/completions
      model: llama-3.1-8b-instant
      api_key_env: GROQ_API_KEY
"#;
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.llm.providers.len(), 2);
        assert_eq!(cfg.llm.providers[0].api_key.as_deref(), Some("dummy"));
        assert_eq!(cfg.llm.providers[1].max_tokens, 4500);
    }

    #[test]
    fn env_overrides_groq_provider() {
        let env: HashMap<&str, &str> = [
            ("GROQ_MODEL", "llama-3.3-70b"),
            ("GROQ_MAX_TOKENS", "1024"),
            ("GROQ_TEMPERATURE", "not-a-number"),
            ("GIT_CLONE_TIMEOUT", "15"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        let groq = &cfg.llm.providers[0];
        assert_eq!(groq.model, "llama-3.3-70b");
        assert_eq!(groq.max_tokens, 1024);
        assert!((groq.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.git.clone_timeout_secs, 15);
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg.yaml");
        std::fs::write(&path, "cache:\n  architecture_capacity: 4\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.cache.architecture_capacity, 4);
    }

    #[test]
    fn load_missing_explicit_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn retry_policy_from_config() {
        let mut cfg = Config::default();
        cfg.llm.rate_limit_backoff_secs = 0.0;
        cfg.llm.max_retries = 5;
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.backoff_base, Duration::ZERO);
    }

    #[test]
    fn yaml_round_trip_keeps_port() {
        let mut cfg = Config::default();
        cfg.server.port = 1234;
        let back = Config::from_yaml(&cfg.to_yaml().unwrap()).unwrap();
        assert_eq!(back.server.port, 1234);
    }
}
