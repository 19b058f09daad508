//! Anthropic messages provider.

use async_trait::async_trait;
use std::time::Duration;

use super::{describe_transport_error, Completion, CompletionRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicProvider {
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
impl Completion for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let payload = serde_json::json!({
            "model": request.model.model,
            "max_tokens": request.model.max_tokens,
            "temperature": request.model.temperature,
            "system": request.instruction,
            "messages": [{
                "role": "user",
                "content": request.prompt,
            }]
        });

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| describe_transport_error("Anthropic", self.timeout, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error {}: {}", status, body);
        }

        let body: serde_json::Value = resp.json().await?;
        // Concatenate every text block; tool-use blocks are not requested.
        let text: String = body["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            anyhow::bail!("Anthropic returned an empty completion");
        }
        Ok(text)
    }
}
