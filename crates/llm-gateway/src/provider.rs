use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::types::{ChatMessage, ChatRequest, ChatResponse, ProviderConfig};
use crate::LlmError;

// ─── Provider ─────────────────────────────────────────────────────────────

/// A configured chat-completion endpoint with a resolved API key.
#[derive(Clone)]
pub(crate) struct Provider {
    pub config: ProviderConfig,
    api_key: String,
}

impl Provider {
    pub(crate) fn new(config: ProviderConfig, api_key: String) -> Self {
        Self { config, api_key }
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    /// Issue a single chat-completion request. Retries are the caller's job.
    pub(crate) async fn complete(
        &self,
        client: &reqwest::Client,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt.to_string(),
        });

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            provider = %self.config.name,
            model = %self.config.model,
            max_tokens = self.config.max_tokens,
            "sending chat completion"
        );

        let response = client
            .post(&self.config.base_url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: self.config.name.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.map_status(status, response.text().await.unwrap_or_default()));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::Malformed {
            provider: self.config.name.clone(),
            message: e.to_string(),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed {
                provider: self.config.name.clone(),
                message: "missing choices[0].message.content".to_string(),
            })
    }

    fn map_status(&self, status: StatusCode, body: String) -> LlmError {
        let provider = self.config.name.clone();
        match status {
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                provider,
                attempts: 1,
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth {
                provider,
                status: status.as_u16(),
            },
            _ => LlmError::Api {
                provider,
                status: status.as_u16(),
                body,
            },
        }
    }
}
