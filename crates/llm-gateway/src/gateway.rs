use async_trait::async_trait;
use tracing::{info, warn};

use crate::provider::Provider;
use crate::types::{ProviderConfig, RetryPolicy};
use crate::{LlmError, Result, TextGenerator};

// ─── Gateway ──────────────────────────────────────────────────────────────

/// Ordered list of providers tried in turn until one answers.
///
/// Each provider gets `policy.max_retries` attempts. Rate limits and transport
/// failures are retried against the same provider; auth failures and other
/// client errors move straight on to the next provider.
#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    providers: Vec<Provider>,
    policy: RetryPolicy,
}

impl Gateway {
    /// Build a gateway from provider configs, dropping any without an API key.
    pub fn new(configs: &[ProviderConfig], policy: RetryPolicy) -> Self {
        let providers = configs
            .iter()
            .filter_map(|c| match c.resolved_api_key() {
                Some(key) => Some(Provider::new(c.clone(), key)),
                None => {
                    warn!(provider = %c.name, "no API key, provider disabled");
                    None
                }
            })
            .collect();

        Self {
            client: reqwest::Client::new(),
            providers,
            policy,
        }
    }

    /// Names of the providers that survived key resolution, in order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_configured(&self) -> bool {
        !self.providers.is_empty()
    }

    async fn try_provider(&self, provider: &Provider, system: &str, user: &str) -> Result<String> {
        let attempts = self.policy.max_retries.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            match provider
                .complete(&self.client, system, user, self.policy.timeout)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < attempts {
                        let wait = match e {
                            LlmError::RateLimited { .. } => self.policy.rate_limit_delay(attempt),
                            _ => self.policy.transport_delay(),
                        };
                        warn!(
                            provider = %provider.name(),
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "LLM call failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(LlmError::RateLimited { provider, .. }) => LlmError::RateLimited { provider, attempts },
            Some(e) => e,
            None => LlmError::NotConfigured,
        })
    }
}

#[async_trait]
impl TextGenerator for Gateway {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if self.providers.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let mut failures = Vec::new();
        for provider in &self.providers {
            match self.try_provider(provider, system_prompt, user_prompt).await {
                Ok(text) => {
                    info!(provider = %provider.name(), chars = text.len(), "LLM response received");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(provider = %provider.name(), error = %e, "provider exhausted, falling back");
                    failures.push(e.to_string());
                }
            }
        }

        Err(LlmError::Exhausted(failures))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn provider_at(server: &mockito::ServerGuard, name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            base_url: format!("{}/v1/chat/completions", server.url()),
            model: "test-model".to_string(),
            api_key: Some("sk-test".to_string()),
            api_key_env: None,
            temperature: 0.3,
            max_tokens: 100,
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    fn completion(text: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("hello"))
            .create_async()
            .await;

        let gw = Gateway::new(&[provider_at(&server, "primary")], fast_policy(3));
        let text = gw.generate("sys", "user").await.unwrap();
        assert_eq!(text, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let gw = Gateway::new(&[provider_at(&server, "primary")], fast_policy(3));
        let err = gw.generate("sys", "user").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rate limit exceeded after 3 attempts"), "{msg}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let gw = Gateway::new(&[provider_at(&server, "primary")], fast_policy(3));
        assert!(gw.generate("sys", "user").await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn falls_back_to_next_provider() {
        let mut bad = mockito::Server::new_async().await;
        let mut good = mockito::Server::new_async().await;
        let _bad = bad
            .mock("POST", "/v1/chat/completions")
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;
        let _good = good
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion("from fallback"))
            .create_async()
            .await;

        let gw = Gateway::new(
            &[provider_at(&bad, "primary"), provider_at(&good, "secondary")],
            fast_policy(2),
        );
        assert_eq!(gw.generate("", "user").await.unwrap(), "from fallback");
    }

    #[tokio::test]
    async fn no_keys_means_not_configured() {
        let mut cfg = ProviderConfig::groq();
        cfg.api_key_env = None;
        let gw = Gateway::new(&[cfg], fast_policy(1));
        assert!(!gw.is_configured());
        let err = gw.generate("s", "u").await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let gw = Gateway::new(&[provider_at(&server, "primary")], fast_policy(1));
        let err = gw.generate("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }
}
