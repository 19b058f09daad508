//! TOML configuration schema.
//!
//! Every section is `#[serde(default)]` so a partial file (or none at all)
//! yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::optimize::OptimizerRole;
use crate::provider::ModelConfig;
use crate::review::AnalysisRole;

/// Default model for the completion service.
const DEFAULT_MODEL: &str = "gpt-4o";

/// Default review batch size (artifacts reviewed concurrently).
const DEFAULT_REVIEW_BATCH_SIZE: usize = 5;

/// Default optimization batch size. Smaller, since each artifact issues
/// several sequential calls after the fan-out.
const DEFAULT_OPTIMIZE_BATCH_SIZE: usize = 3;

/// Default timeout for a single completion call.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ── Top-level config ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub review: ReviewConfig,
    pub optimize: OptimizeConfig,
    pub discovery: DiscoveryConfig,
    pub output: OutputConfig,
    /// Where this config was loaded from (not serialized).
    #[serde(skip)]
    pub config_path: PathBuf,
}

// ── Provider ─────────────────────────────────────────────────────

/// Which completion API to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    /// Override the API base URL (proxies, compatible gateways, tests).
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.into(),
            temperature: 0.2,
            max_tokens: 4096,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Model settings used by analysis and optimizer roles.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

// ── Review / optimize ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub batch_size: usize,
    /// Analysis roles to run, in report-section order.
    pub roles: Vec<AnalysisRole>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_REVIEW_BATCH_SIZE,
            roles: AnalysisRole::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    pub batch_size: usize,
    /// Temperature for the apply step, which should reproduce files faithfully.
    pub apply_temperature: f64,
    /// Optimizer roles to run. Each edits a different part of the model.
    pub roles: Vec<OptimizerRole>,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_OPTIMIZE_BATCH_SIZE,
            apply_temperature: 0.0,
            roles: OptimizerRole::ALL.to_vec(),
        }
    }
}

// ── Discovery ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Extensions (without dot) of transformation-definition files.
    pub definition_extensions: Vec<String>,
    /// Extensions (without dot) of documentation files.
    pub documentation_extensions: Vec<String>,
    /// Resolve models declared inside shared schema files (`schema.yml`).
    pub schema_lookup: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            definition_extensions: vec!["sql".into()],
            documentation_extensions: vec!["yml".into(), "yaml".into()],
            schema_lookup: true,
        }
    }
}

// ── Output ───────────────────────────────────────────────────────

/// Serialization format for report documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub review_dir: PathBuf,
    pub optimization_dir: PathBuf,
    pub format: ReportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            review_dir: PathBuf::from("review_results"),
            optimization_dir: PathBuf::from("optimized_models"),
            format: ReportFormat::Markdown,
        }
    }
}
