//! `llm-gateway` — the single narrow LLM capability used by every agent:
//! submit `(system_prompt, user_prompt)` and receive generated text.
//!
//! # Architecture
//!
//! ```text
//! ProviderConfig[]  ← from config.yaml / GROQ_* env vars
//!     │
//!     ▼
//! Gateway           ← tries providers in order (fallback)
//!     │
//!     ▼
//! Provider          ← one OpenAI-compatible POST /chat/completions,
//!                     retried on 429 / transport errors per RetryPolicy
//! ```
//!
//! Callers depend on the [`TextGenerator`] trait, not on [`Gateway`], so tests
//! can swap in canned responses.

pub mod error;
pub mod gateway;
pub mod types;

pub(crate) mod provider;

pub use error::LlmError;
pub use gateway::Gateway;
pub use types::{ProviderConfig, RetryPolicy, GROQ_MODEL, GROQ_URL};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Anything that can turn a system + user prompt into text.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
