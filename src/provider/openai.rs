//! OpenAI chat-completions provider.

use async_trait::async_trait;
use std::time::Duration;

use super::{describe_transport_error, Completion, CompletionRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Completion for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let payload = serde_json::json!({
            "model": request.model.model,
            "temperature": request.model.temperature,
            "max_tokens": request.model.max_tokens,
            "messages": [
                { "role": "system", "content": request.instruction },
                { "role": "user", "content": request.prompt },
            ]
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| describe_transport_error("OpenAI", self.timeout, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {}: {}", status, body);
        }

        let body: serde_json::Value = resp.json().await?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("OpenAI returned an empty completion");
        }
        Ok(text.to_string())
    }
}
