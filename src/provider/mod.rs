//! Completion service abstraction.
//!
//! Every analysis, optimizer, apply and evaluation role talks to the
//! language model through [`Completion`]. Calls are fallible: providers
//! rate-limit, time out and return text that may not be what the prompt
//! asked for. Callers validate everything they parse.

pub mod anthropic;
pub mod openai;
pub mod response;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{RunError, RunResult};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Model parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ModelConfig {
    /// Same model, different temperature.
    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }
}

/// A single prompt sent to the completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Role instruction (system prompt).
    pub instruction: String,
    /// User message.
    pub prompt: String,
    pub model: ModelConfig,
}

/// `complete(prompt, model-config) -> text`.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Provider name for logs and reports.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;
}

/// Build the provider selected in configuration.
pub fn from_config(config: &ProviderConfig) -> RunResult<Arc<dyn Completion>> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| RunError::Config {
            path: std::path::PathBuf::from("[provider]"),
            reason: format!(
                "No API key for {:?}: set provider.api_key or {}",
                config.kind,
                config.kind.api_key_env()
            ),
        })?;
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn Completion> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            api_key,
            config.base_url.clone(),
            timeout,
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            api_key,
            config.base_url.clone(),
            timeout,
        )),
    };
    Ok(provider)
}

/// Map a transport error, calling out timeouts explicitly.
pub(crate) fn describe_transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        anyhow::anyhow!("{provider} request timed out after {}s", timeout.as_secs())
    } else {
        anyhow::anyhow!("{provider} request failed: {e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_key() {
        let config = ProviderConfig::default();
        let err = from_config(&config).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn from_config_builds_selected_kind() {
        let config = ProviderConfig {
            kind: ProviderKind::Anthropic,
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn with_temperature_keeps_model() {
        let base = ModelConfig {
            model: "gpt-4o".into(),
            temperature: 0.2,
            max_tokens: 1024,
        };
        let cold = base.with_temperature(0.0);
        assert_eq!(cold.model, "gpt-4o");
        assert_eq!(cold.max_tokens, 1024);
        assert_eq!(cold.temperature, 0.0);
    }
}
