use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no LLM provider configured: set an API key for at least one provider")]
    NotConfigured,

    #[error("{provider}: rate limit exceeded after {attempts} attempts, wait 60 seconds and try again")]
    RateLimited { provider: String, attempts: u32 },

    #[error("{provider}: authentication failed ({status})")]
    Auth { provider: String, status: u16 },

    #[error("{provider}: API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider}: malformed response: {message}")]
    Malformed { provider: String, message: String },

    #[error("all LLM providers failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

impl LlmError {
    /// Whether another attempt against the same provider may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Transport { .. } => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
