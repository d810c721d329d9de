//! Client for an OpenAI-compatible chat-completion API (Groq by default).
//!
//! Only the non-streaming `POST {base_url}/chat/completions` call is used:
//! one system message and one user message in, the first choice's text out.

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::LlmConfig;

/// Keys shorter than this are rejected without a network call.
pub const MIN_API_KEY_LEN: usize = 10;

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Send `[system, user]` and return the reply text.
    pub async fn complete(&self, api_key: &str, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        self.send(api_key, &body, self.config.max_retries).await
    }

    /// Check a key: too-short keys fail immediately, otherwise a one-token
    /// completion must succeed. Never errors; any failure means "invalid".
    pub async fn validate_api_key(&self, api_key: &str) -> bool {
        if api_key.trim().chars().count() < MIN_API_KEY_LEN {
            return false;
        }
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": "test" }],
            "max_tokens": 1,
        });
        match self.send(api_key.trim(), &body, 0).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "API key validation failed");
                false
            }
        }
    }

    async fn send(
        &self,
        api_key: &str,
        body: &serde_json::Value,
        max_retries: u32,
    ) -> Result<String> {
        let url = self.endpoint();
        let mut last_err = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .http
                .post(&url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(anyhow!("connection error: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: CompletionResponse = response
                    .json()
                    .await
                    .map_err(|e| anyhow!("invalid completion response: {}", e))?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content.unwrap_or_default())
                    .ok_or_else(|| anyhow!("completion response has no choices"));
            }

            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                last_err = Some(anyhow!("API error {}: {}", status, text));
                continue;
            }
            bail!("API error {}: {}", status, text);
        }

        Err(last_err.unwrap_or_else(|| anyhow!("completion failed after retries")))
    }
}
