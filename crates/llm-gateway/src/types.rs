use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─── ProviderConfig ───────────────────────────────────────────────────────

/// One OpenAI-compatible chat-completion endpoint.
///
/// The API key is either given inline or read from `api_key_env` at the time
/// the gateway is built. Providers without a usable key are skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

pub const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const GROQ_MODEL: &str = "llama-3.1-8b-instant";

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4500
}

impl ProviderConfig {
    /// The default provider: Groq, keyed by `GROQ_API_KEY`.
    pub fn groq() -> Self {
        Self {
            name: "groq".to_string(),
            base_url: GROQ_URL.to_string(),
            model: GROQ_MODEL.to_string(),
            api_key: None,
            api_key_env: Some("GROQ_API_KEY".to_string()),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Inline key wins over the environment; blank values count as absent.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

// ─── RetryPolicy ──────────────────────────────────────────────────────────

/// Attempts per provider and the wait between them.
///
/// Waits are expressed in multiples of `backoff_base` so tests can run the
/// full retry ladder with a zero base.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait after a 429: `10 + attempt * 15` units plus up to 5 units of jitter.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::random::<f64>() * 5.0;
        let units = 10.0 + f64::from(attempt) * 15.0 + jitter;
        self.backoff_base.mul_f64(units)
    }

    /// Wait after a transport failure or a 5xx.
    pub fn transport_delay(&self) -> Duration {
        self.backoff_base
    }
}

// ─── Wire types (OpenAI-compatible) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
}
